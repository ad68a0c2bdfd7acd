//! Error types for the schema explorer.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every variant belongs to one [`ErrorKind`] of the public taxonomy, and the HTTP
//! boundary maps each kind to a status code with a single `detail` message.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid connection descriptor: {message}")]
    InvalidDescriptor { message: String },

    #[error("Not connected. Call /connect first.")]
    NotConnected,

    #[error("Database error: {message}{}", object_suffix(.object))]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table, or the SQL Server error number
        sql_state: Option<String>,
        /// Qualified object being inspected when the error occurred
        object: Option<String>,
    },

    #[error(
        "Timeout: {operation} exceeded {}{}",
        format_limit(.limit),
        object_suffix(.object)
    )]
    Timeout {
        operation: String,
        limit: Duration,
        object: Option<String>,
    },

    #[error("{object_type} '{object}' not found")]
    NotFound { object_type: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn object_suffix(object: &Option<String>) -> String {
    object
        .as_ref()
        .map(|o| format!(" (object: {})", o))
        .unwrap_or_default()
}

/// Render a timeout limit, in milliseconds below one second.
fn format_limit(limit: &Duration) -> String {
    if limit.as_secs() == 0 {
        format!("{}ms", limit.as_millis())
    } else if limit.subsec_millis() == 0 {
        format!("{}s", limit.as_secs())
    } else {
        format!("{:.1}s", limit.as_secs_f64())
    }
}

/// Error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Cannot establish or validate a session
    Connection,
    /// Metadata operation attempted with no active session
    NotConnected,
    /// Engine rejected or timed out a metadata query
    Query,
    /// Named schema/table/view does not exist
    NotFound,
    /// Request body could not be understood
    InvalidInput,
    Internal,
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid descriptor error.
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            object: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
            object: None,
        }
    }

    /// Convert a sqlx error raised by a pool whose acquire limit is `acquire_timeout`.
    pub fn from_sqlx(err: sqlx::Error, acquire_timeout: Duration) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::timeout("connection pool acquire", acquire_timeout),
            other => other.into(),
        }
    }

    /// Convert a bb8 checkout error raised by a pool whose acquire limit is `acquire_timeout`.
    pub fn from_bb8(err: bb8::RunError<bb8_tiberius::Error>, acquire_timeout: Duration) -> Self {
        match err {
            bb8::RunError::TimedOut => Self::timeout("connection pool acquire", acquire_timeout),
            other => other.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(object_type: impl Into<String>, object: impl Into<String>) -> Self {
        Self::NotFound {
            object_type: object_type.into(),
            object: object.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Tag a query error with the object that was being inspected.
    ///
    /// Database errors and timeouts carry the tag; other variants pass through
    /// unchanged. The first tag wins.
    pub fn with_object(self, qualified: impl Into<String>) -> Self {
        match self {
            Self::Database {
                message,
                sql_state,
                object: None,
            } => Self::Database {
                message,
                sql_state,
                object: Some(qualified.into()),
            },
            Self::Timeout {
                operation,
                limit,
                object: None,
            } => Self::Timeout {
                operation,
                limit,
                object: Some(qualified.into()),
            },
            other => other,
        }
    }

    /// Classify this error into the public taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } | Self::InvalidDescriptor { .. } => ErrorKind::Connection,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::Database { .. } | Self::Timeout { .. } => ErrorKind::Query,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::NotConnected => Some("Connect to a database with POST /connect"),
            _ => None,
        }
    }

    /// HTTP status used at the request boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidDescriptor { .. } | Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::NotConnected => StatusCode::CONFLICT,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Connection { .. } => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection descriptor fields",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::database("No rows returned", None),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise --max-connections or --connect-timeout",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found in catalog result: {}", col))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert tiberius (SQL Server) errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => {
                DbError::database(token.message(), Some(token.code().to_string()))
            }
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(message) => DbError::connection(
                format!("TLS error: {}", message),
                "Verify TLS configuration and certificates",
            ),
            TdsError::Protocol(message) => DbError::connection(
                format!("Protocol error: {}", message),
                "Check database server compatibility",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested routing to {}:{}", host, port),
                "Connect to the routed host directly",
            ),
            other => DbError::internal(format!("SQL Server driver error: {}", other)),
        }
    }
}

/// Convert bb8 pool errors for the SQL Server pool.
impl From<bb8::RunError<bb8_tiberius::Error>> for DbError {
    fn from(err: bb8::RunError<bb8_tiberius::Error>) -> Self {
        match err {
            bb8::RunError::User(bb8_tiberius::Error::Tiberius(e)) => e.into(),
            bb8::RunError::User(bb8_tiberius::Error::Io(e)) => DbError::connection(
                format!("I/O error: {}", e),
                "Check network connectivity and database server status",
            ),
            bb8::RunError::TimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise --max-connections or --connect-timeout",
            ),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Error envelope returned by every failing request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_database_error_display_includes_object() {
        let err = DbError::database("permission denied", Some("42501".to_string()))
            .with_object("public.users");
        assert_eq!(
            err.to_string(),
            "Database error: permission denied (object: public.users)"
        );
    }

    #[test]
    fn test_with_object_keeps_first_tag() {
        let err = DbError::database("boom", None)
            .with_object("a.b")
            .with_object("c.d");
        assert!(err.to_string().contains("a.b"));
        assert!(!err.to_string().contains("c.d"));
    }

    #[test]
    fn test_with_object_tags_timeouts() {
        let err = DbError::timeout("table_columns", Duration::from_secs(30))
            .with_object("public.users");
        assert!(matches!(err, DbError::Timeout { .. }));
        assert_eq!(err.kind(), ErrorKind::Query);
        assert_eq!(
            err.to_string(),
            "Timeout: table_columns exceeded 30s (object: public.users)"
        );
    }

    #[test]
    fn test_with_object_leaves_other_kinds_unchanged() {
        let err = DbError::not_found("Table", "public.users").with_object("x.y");
        assert_eq!(err.to_string(), "Table 'public.users' not found");
    }

    #[test]
    fn test_timeout_limit_formatting() {
        assert_eq!(
            DbError::timeout("q", Duration::from_millis(50)).to_string(),
            "Timeout: q exceeded 50ms"
        );
        assert_eq!(
            DbError::timeout("q", Duration::from_millis(1500)).to_string(),
            "Timeout: q exceeded 1.5s"
        );
        assert_eq!(
            DbError::timeout("q", Duration::from_secs(10)).to_string(),
            "Timeout: q exceeded 10s"
        );
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            DbError::invalid_descriptor("bad port").kind(),
            ErrorKind::Connection
        );
        assert_eq!(DbError::connection("x", "y").kind(), ErrorKind::Connection);
        assert_eq!(DbError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(DbError::database("x", None).kind(), ErrorKind::Query);
        assert_eq!(DbError::not_found("Table", "a.b").kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            DbError::invalid_descriptor("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(DbError::NotConnected.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            DbError::not_found("Table", "public.t").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            DbError::connection("x", "y").status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            DbError::timeout("q", Duration::from_secs(30)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            DbError::database("x", None).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        let err = DbError::not_found("Table", "public.orders");
        assert_eq!(err.to_string(), "Table 'public.orders' not found");
    }

    #[test]
    fn test_sqlx_pool_closed_is_connection_error() {
        let err: DbError = sqlx::Error::PoolClosed.into();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_sqlx_pool_timeout_reports_configured_limit() {
        let err = DbError::from_sqlx(sqlx::Error::PoolTimedOut, Duration::from_millis(250));
        assert!(matches!(err, DbError::Timeout { .. }));
        assert_eq!(
            err.to_string(),
            "Timeout: connection pool acquire exceeded 250ms"
        );
    }

    #[test]
    fn test_bb8_pool_timeout_reports_configured_limit() {
        let err = DbError::from_bb8(bb8::RunError::TimedOut, Duration::from_secs(10));
        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(err.to_string().contains("exceeded 10s"));
    }

    #[test]
    fn test_from_sqlx_passes_other_errors_through() {
        let err = DbError::from_sqlx(sqlx::Error::PoolClosed, Duration::from_secs(10));
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn test_suggestion() {
        let err = DbError::connection("failed", "try reconnecting");
        assert_eq!(err.suggestion(), Some("try reconnecting"));
        assert!(DbError::database("x", None).suggestion().is_none());
    }
}
