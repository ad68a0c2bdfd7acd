//! Dialect adapter capability set.
//!
//! Each supported engine implements [`DialectAdapter`] and answers every
//! metadata question in its own catalog terms. Results stay in the raw,
//! engine-native shape; normalization happens in the metadata layer.

use crate::db::mysql::MySqlAdapter;
use crate::db::postgres::PostgresAdapter;
use crate::db::sqlserver::SqlServerAdapter;
use crate::error::DbResult;
use crate::models::{
    DatabaseType, ObjectRef, RawColumn, RawColumnMatch, RawIndexColumn, RawSize, RawTableStats,
    ValidatedDescriptor,
};
use async_trait::async_trait;
use std::time::Duration;

/// Pool sizing and timeouts applied to every session pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Metadata capabilities every engine variant provides.
#[async_trait]
pub trait DialectAdapter: Send + Sync + std::fmt::Debug {
    fn db_type(&self) -> DatabaseType;

    /// Version string captured when the session was opened.
    fn server_version(&self) -> Option<&str>;

    async fn count_schemas(&self) -> DbResult<u64>;

    async fn count_tables(&self) -> DbResult<u64>;

    async fn count_views(&self) -> DbResult<u64>;

    /// Total size of the attached database, `None` when the engine cannot tell.
    async fn database_size(&self) -> DbResult<Option<RawSize>>;

    async fn list_tables(&self) -> DbResult<Vec<ObjectRef>>;

    async fn list_views(&self) -> DbResult<Vec<ObjectRef>>;

    async fn table_exists(&self, table: &ObjectRef) -> DbResult<bool>;

    /// Row estimate and size for one table, `None` if the table does not exist.
    async fn table_stats(&self, table: &ObjectRef) -> DbResult<Option<RawTableStats>>;

    /// Column rows in ordinal order.
    async fn table_columns(&self, table: &ObjectRef) -> DbResult<Vec<RawColumn>>;

    /// One row per (index, key column).
    async fn table_indexes(&self, table: &ObjectRef) -> DbResult<Vec<RawIndexColumn>>;

    /// Columns named `column_name` (case-insensitive) across user schemas.
    async fn find_columns(&self, column_name: &str) -> DbResult<Vec<RawColumnMatch>>;

    /// Outer `None` when the view does not exist; inner `None` when its text is hidden.
    async fn view_definition(&self, view: &ObjectRef) -> DbResult<Option<Option<String>>>;

    /// Release the pool and every socket it holds.
    async fn close(&self);
}

/// Opens a live adapter for a validated descriptor.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, descriptor: &ValidatedDescriptor)
    -> DbResult<Box<dyn DialectAdapter>>;
}

/// Connector backed by the real engine drivers.
#[derive(Debug, Clone, Default)]
pub struct NativeConnector {
    settings: PoolSettings,
}

impl NativeConnector {
    pub fn new(settings: PoolSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Connector for NativeConnector {
    async fn connect(
        &self,
        descriptor: &ValidatedDescriptor,
    ) -> DbResult<Box<dyn DialectAdapter>> {
        match descriptor {
            ValidatedDescriptor::Postgres(target) => Ok(Box::new(
                PostgresAdapter::connect(target, &self.settings).await?,
            )),
            ValidatedDescriptor::MySql(target) => Ok(Box::new(
                MySqlAdapter::connect(target, &self.settings).await?,
            )),
            ValidatedDescriptor::SqlServer(target) => Ok(Box::new(
                SqlServerAdapter::connect(target, &self.settings).await?,
            )),
        }
    }
}

/// Generate a helpful suggestion for connection errors.
pub(crate) fn connection_suggestion(db_type: DatabaseType, error: &str) -> String {
    let error_str = error.to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication")
        || error_str.contains("password")
        || error_str.contains("login failed")
    {
        return "Verify the username and password".to_string();
    }

    if error_str.contains("does not exist")
        || error_str.contains("unknown database")
        || error_str.contains("cannot open database")
    {
        return "Check that the database name exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration".to_string();
    }

    format!(
        "Verify host and port (default {}) are reachable",
        db_type.default_port()
    )
}
