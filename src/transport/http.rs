//! HTTP transport for the schema explorer.
//!
//! Serves the JSON routes of [`super::routes`] with axum and closes the active
//! session once the server has shut down.

use crate::error::{DbError, DbResult};
use crate::transport::Transport;
use crate::transport::routes::{AppState, router};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// HTTP transport implementation.
pub struct HttpTransport {
    state: AppState,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
    /// Allowed CORS origins; empty allows any
    allowed_origins: Vec<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    ///
    /// # Arguments
    ///
    /// * `state` - Session and metadata service shared by all handlers
    /// * `host` - Host address to bind to
    /// * `port` - Port to bind to
    /// * `allowed_origins` - CORS origins; empty allows any origin
    pub fn new(
        state: AppState,
        host: impl Into<String>,
        port: u16,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            state,
            host: host.into(),
            port,
            allowed_origins,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!("Starting schema explorer HTTP server on {}", bind_addr);

        let app = router(self.state.clone(), &self.allowed_origins);

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::internal(format!(
                "Failed to bind to {}: {}. Check that the port is available",
                bind_addr, e
            ))
        })?;

        let cors = if self.allowed_origins.is_empty() {
            "any"
        } else {
            "restricted"
        };
        info!(cors, "HTTP endpoints ready");

        // Slow metadata queries may hold requests open; force exit after a
        // timeout once the shutdown signal is received
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        // Race between: server completing normally vs forced timeout/second signal after shutdown
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {
                // Timeout or second signal reached - server will be dropped
            }
        }

        if self.state.session.close().await {
            info!("Closed active database session");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
