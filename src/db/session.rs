//! Process-wide active session.
//!
//! [`ConnectionSession`] owns zero or one live adapter. Metadata requests hold a
//! shared read guard ([`SessionHandle`]) for their whole duration, so a replace
//! waits for in-flight requests and requests arriving mid-replace wait for the
//! new adapter. Opens are serialized by a separate gate so that the slow
//! connect work never runs under the session lock.

use crate::db::adapter::{Connector, DialectAdapter};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, DatabaseType, SessionInfo};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedRwLockReadGuard, RwLock};
use tracing::{info, warn};

/// The live adapter together with what it was opened against.
#[derive(Debug)]
pub struct ActiveSession {
    adapter: Box<dyn DialectAdapter>,
    database: String,
    target: String,
    connected_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn adapter(&self) -> &dyn DialectAdapter {
        self.adapter.as_ref()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.adapter.db_type()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            db_type: self.adapter.db_type(),
            database: self.database.clone(),
            server_version: self.adapter.server_version().map(str::to_string),
            connected_at: self.connected_at,
        }
    }
}

/// Shared read access to the active session; the session cannot be replaced
/// or closed while a handle is alive.
pub type SessionHandle = OwnedRwLockReadGuard<Option<ActiveSession>, ActiveSession>;

#[derive(Clone)]
pub struct ConnectionSession {
    connector: Arc<dyn Connector>,
    active: Arc<RwLock<Option<ActiveSession>>>,
    connect_gate: Arc<Mutex<()>>,
    connect_timeout: Duration,
}

impl ConnectionSession {
    pub fn new(connector: Arc<dyn Connector>, connect_timeout: Duration) -> Self {
        Self {
            connector,
            active: Arc::new(RwLock::new(None)),
            connect_gate: Arc::new(Mutex::new(())),
            connect_timeout,
        }
    }

    /// Validate `descriptor`, connect, and install the result as the active
    /// session, closing any previous one.
    ///
    /// On failure the previous session stays active and untouched.
    pub async fn open(&self, descriptor: &ConnectionDescriptor) -> DbResult<SessionInfo> {
        let validated = descriptor.validate()?;
        let db_type = validated.db_type();
        let target = validated.masked();

        let _gate = self.connect_gate.lock().await;

        info!(db_type = %db_type, target = %target, "Opening database session");
        let started = Instant::now();

        let adapter =
            match tokio::time::timeout(self.connect_timeout, self.connector.connect(&validated))
                .await
            {
                Ok(Ok(adapter)) => adapter,
                Ok(Err(e)) => {
                    warn!(db_type = %db_type, target = %target, error = %e, "Failed to open session");
                    return Err(e);
                }
                Err(_) => {
                    warn!(
                        db_type = %db_type,
                        target = %target,
                        timeout_secs = self.connect_timeout.as_secs(),
                        "Timed out opening session"
                    );
                    return Err(DbError::connection(
                        format!(
                            "Timed out after {}s connecting to {}",
                            self.connect_timeout.as_secs(),
                            target
                        ),
                        "Check that the host is reachable and the port is correct",
                    ));
                }
            };

        let session = ActiveSession {
            adapter,
            database: validated.database().to_string(),
            target: target.clone(),
            connected_at: Utc::now(),
        };
        let session_info = session.info();

        {
            let mut active = self.active.write().await;
            if let Some(previous) = active.replace(session) {
                info!(
                    db_type = %previous.db_type(),
                    target = %previous.target,
                    "Closing replaced session"
                );
                previous.adapter.close().await;
            }
        }

        info!(
            db_type = %db_type,
            target = %target,
            server_version = ?session_info.server_version,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Session opened"
        );
        Ok(session_info)
    }

    /// Resolve the active session or fail fast with `NotConnected`.
    pub async fn current(&self) -> DbResult<SessionHandle> {
        let guard = self.active.clone().read_owned().await;
        OwnedRwLockReadGuard::try_map(guard, |active| active.as_ref())
            .map_err(|_| DbError::NotConnected)
    }

    /// Summary of the active session, if any.
    pub async fn info(&self) -> Option<SessionInfo> {
        self.active.read().await.as_ref().map(ActiveSession::info)
    }

    pub async fn is_connected(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Release the active session. Returns whether one was open.
    pub async fn close(&self) -> bool {
        let mut active = self.active.write().await;
        match active.take() {
            Some(session) => {
                info!(
                    db_type = %session.db_type(),
                    target = %session.target,
                    "Closing session"
                );
                session.adapter.close().await;
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}
