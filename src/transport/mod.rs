//! Transport layer for the schema explorer.
//!
//! HTTP is the only transport: JSON request/response routes over axum.

pub mod http;
pub mod routes;

pub use http::HttpTransport;
pub use routes::{AppState, router};

use crate::error::DbResult;
use std::future::Future;

/// Trait for server transports.
pub trait Transport: Send + Sync {
    /// Start the transport and begin handling requests.
    ///
    /// This method should block until the transport is shut down.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Get the name of this transport for logging.
    fn name(&self) -> &'static str;
}
