//! DB Schema Explorer - Main entry point.
//!
//! Serves normalized schema metadata of PostgreSQL, MySQL and SQL Server
//! databases over HTTP.

use clap::Parser;
use db_schema_explorer::config::Config;
use db_schema_explorer::db::{ConnectionSession, NativeConnector};
use db_schema_explorer::metadata::MetadataService;
use db_schema_explorer::transport::{AppState, HttpTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    info!("Starting DB Schema Explorer v{}", env!("CARGO_PKG_VERSION"));

    let connector = Arc::new(NativeConnector::new(config.pool_settings()));
    let session = ConnectionSession::new(connector, config.connect_timeout_duration());
    let metadata = MetadataService::new(session.clone(), config.query_timeout_duration());

    // Open the startup connection, if any
    if let Some(descriptor) = config.connect_descriptor()? {
        info!(db_type = %descriptor.db_type(), "Connecting to startup database");
        session.open(&descriptor).await?;
    }

    info!(
        host = %config.http_host,
        port = config.http_port,
        "Using HTTP transport"
    );
    let transport = HttpTransport::new(
        AppState::new(metadata),
        &config.http_host,
        config.http_port,
        config.allowed_origins.clone(),
    );

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
