//! SQL Server dialect adapter.
//!
//! Uses `tiberius` over a `bb8` pool. Names and columns come from
//! `INFORMATION_SCHEMA`; statistics, sizes and index layout come from the
//! `sys` catalog views. Sizes are reported in 8 KiB pages.

use crate::db::adapter::{DialectAdapter, PoolSettings, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{
    DatabaseType, ObjectRef, RawColumn, RawColumnMatch, RawIndexColumn, RawSize, RawTableStats,
    SqlServerAuth, SqlServerTarget,
};
use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use std::time::Duration;
use tiberius::{AuthMethod, Config, Row};
use tokio::sync::RwLock;
use tracing::{debug, warn};

type MssqlPool = Pool<ConnectionManager>;

mod queries {
    pub const SERVER_VERSION: &str =
        "SELECT CAST(SERVERPROPERTY('ProductVersion') AS NVARCHAR(128))";

    pub const COUNT_SCHEMAS: &str = "SELECT CAST(COUNT(*) AS BIGINT) FROM sys.schemas";

    pub const COUNT_TABLES: &str =
        "SELECT CAST(COUNT(*) AS BIGINT) FROM sys.tables WHERE is_ms_shipped = 0";

    pub const COUNT_VIEWS: &str =
        "SELECT CAST(COUNT(*) AS BIGINT) FROM sys.views WHERE is_ms_shipped = 0";

    pub const DATABASE_SIZE: &str = r#"
        SELECT CAST(SUM(CAST(FILEPROPERTY(name, 'SpaceUsed') AS BIGINT)) AS BIGINT)
        FROM sys.database_files
        WHERE type_desc = 'ROWS'
        "#;

    pub const LIST_TABLES: &str = r#"
        SELECT s.name, t.name
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE t.is_ms_shipped = 0
        ORDER BY s.name, t.name
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT s.name, v.name
        FROM sys.views v
        JOIN sys.schemas s ON s.schema_id = v.schema_id
        WHERE v.is_ms_shipped = 0
        ORDER BY s.name, v.name
        "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT CAST(COUNT(*) AS BIGINT)
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE s.name = @P1 AND t.name = @P2
        "#;

    pub const TABLE_STATS: &str = r#"
        SELECT
            (SELECT CAST(COALESCE(SUM(p.rows), 0) AS BIGINT)
             FROM sys.partitions p
             WHERE p.object_id = t.object_id AND p.index_id IN (0, 1)) AS row_estimate,
            (SELECT CAST(COALESCE(SUM(a.total_pages), 0) AS BIGINT)
             FROM sys.partitions p
             JOIN sys.allocation_units a ON a.container_id = p.partition_id
             WHERE p.object_id = t.object_id) AS total_pages
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        WHERE s.name = @P1 AND t.name = @P2
        "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT
            COLUMN_NAME,
            DATA_TYPE,
            CAST(CHARACTER_MAXIMUM_LENGTH AS BIGINT),
            CASE WHEN DATA_TYPE IN ('decimal', 'numeric') THEN CAST(NUMERIC_PRECISION AS BIGINT) END,
            CASE WHEN DATA_TYPE IN ('decimal', 'numeric') THEN CAST(NUMERIC_SCALE AS BIGINT) END,
            IS_NULLABLE,
            COLUMN_DEFAULT
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = @P1 AND TABLE_NAME = @P2
        ORDER BY ORDINAL_POSITION
        "#;

    pub const TABLE_INDEXES: &str = r#"
        SELECT
            i.name,
            c.name,
            CAST(ic.key_ordinal AS BIGINT),
            i.is_unique,
            i.is_primary_key,
            i.type_desc
        FROM sys.indexes i
        JOIN sys.tables t ON t.object_id = i.object_id
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE s.name = @P1 AND t.name = @P2
          AND i.index_id > 0
          AND i.is_hypothetical = 0
          AND ic.is_included_column = 0
        ORDER BY i.name, ic.key_ordinal, ic.index_column_id
        "#;

    pub const FIND_COLUMNS: &str = r#"
        SELECT
            c.TABLE_SCHEMA,
            c.TABLE_NAME,
            c.COLUMN_NAME,
            c.DATA_TYPE,
            CAST(c.CHARACTER_MAXIMUM_LENGTH AS BIGINT),
            CASE WHEN c.DATA_TYPE IN ('decimal', 'numeric') THEN CAST(c.NUMERIC_PRECISION AS BIGINT) END,
            CASE WHEN c.DATA_TYPE IN ('decimal', 'numeric') THEN CAST(c.NUMERIC_SCALE AS BIGINT) END,
            c.IS_NULLABLE,
            c.COLUMN_DEFAULT
        FROM INFORMATION_SCHEMA.COLUMNS c
        JOIN INFORMATION_SCHEMA.TABLES t
          ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
        WHERE LOWER(c.COLUMN_NAME) = LOWER(@P1) AND t.TABLE_TYPE = 'BASE TABLE'
        ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME
        "#;

    pub const VIEW_DEFINITION: &str = r#"
        SELECT m.definition
        FROM sys.views v
        JOIN sys.schemas s ON s.schema_id = v.schema_id
        LEFT JOIN sys.sql_modules m ON m.object_id = v.object_id
        WHERE s.name = @P1 AND v.name = @P2
        "#;
}

fn get_string(row: &Row, idx: usize) -> String {
    get_optional_string(row, idx).unwrap_or_default()
}

fn get_optional_string(row: &Row, idx: usize) -> Option<String> {
    row.try_get::<&str, _>(idx).ok().flatten().map(str::to_string)
}

fn get_i64(row: &Row, idx: usize) -> Option<i64> {
    row.try_get::<i64, _>(idx).ok().flatten()
}

fn get_bool(row: &Row, idx: usize) -> bool {
    row.try_get::<bool, _>(idx).ok().flatten().unwrap_or(false)
}

/// Column row starting at `offset` (name, type, length, precision, scale, nullable, default).
fn column_from_row(row: &Row, offset: usize) -> RawColumn {
    RawColumn {
        name: get_string(row, offset),
        data_type: get_string(row, offset + 1),
        max_length: get_i64(row, offset + 2),
        numeric_precision: get_i64(row, offset + 3),
        numeric_scale: get_i64(row, offset + 4),
        is_nullable: get_string(row, offset + 5),
        default_value: get_optional_string(row, offset + 6),
    }
}

fn auth_method(auth: &SqlServerAuth) -> DbResult<AuthMethod> {
    match auth {
        SqlServerAuth::SqlLogin { username, password } => {
            Ok(AuthMethod::sql_server(username, password))
        }
        #[cfg(windows)]
        SqlServerAuth::Integrated => Ok(AuthMethod::Integrated),
        #[cfg(not(windows))]
        SqlServerAuth::Integrated => Err(DbError::connection(
            "Integrated authentication (trusted_connection) is only available on Windows hosts",
            "Provide a SQL Server login with username and password",
        )),
    }
}

pub struct SqlServerAdapter {
    /// `None` once closed
    pool: RwLock<Option<MssqlPool>>,
    acquire_timeout: Duration,
    server_version: Option<String>,
}

impl std::fmt::Debug for SqlServerAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerAdapter")
            .field("acquire_timeout", &self.acquire_timeout)
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

impl SqlServerAdapter {
    /// Build a pool against `target` and verify it with a round trip.
    pub async fn connect(target: &SqlServerTarget, settings: &PoolSettings) -> DbResult<Self> {
        let mut config = Config::new();
        config.host(&target.host);
        config.port(target.port);
        config.database(&target.database);
        config.authentication(auth_method(&target.auth)?);
        config.application_name("db-schema-explorer");
        config.trust_cert();

        let pool = Pool::builder()
            .max_size(settings.max_connections)
            .connection_timeout(settings.connect_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .retry_connection(false)
            .build(ConnectionManager::new(config))
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to create connection pool: {}", e),
                    connection_suggestion(DatabaseType::SqlServer, &e.to_string()),
                )
            })?;

        // bb8 connects lazily; force one login so bad credentials fail here
        let server_version = {
            let mut conn = pool.get().await.map_err(|e| {
                let message = DbError::from(e).to_string();
                DbError::connection(
                    format!("Failed to connect: {}", message),
                    connection_suggestion(DatabaseType::SqlServer, &message),
                )
            })?;

            let row = conn
                .simple_query(queries::SERVER_VERSION)
                .await?
                .into_row()
                .await;
            match row {
                Ok(row) => {
                    let version = row.as_ref().and_then(|r| get_optional_string(r, 0));
                    debug!(version = ?version, "Got server version");
                    version
                }
                Err(e) => {
                    warn!(error = %e, "Failed to get server version");
                    None
                }
            }
        };

        Ok(Self {
            pool: RwLock::new(Some(pool)),
            acquire_timeout: settings.connect_timeout,
            server_version,
        })
    }

    async fn pool(&self) -> DbResult<MssqlPool> {
        self.pool
            .read()
            .await
            .clone()
            .ok_or_else(|| {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            })
    }

    async fn fetch_all(&self, sql: &str, params: &[&str]) -> DbResult<Vec<Row>> {
        let pool = self.pool().await?;
        let mut conn = pool
            .get()
            .await
            .map_err(|e| DbError::from_bb8(e, self.acquire_timeout))?;
        let params: Vec<&dyn tiberius::ToSql> =
            params.iter().map(|p| p as &dyn tiberius::ToSql).collect();
        let rows = conn.query(sql, &params).await?.into_first_result().await?;
        Ok(rows)
    }

    async fn fetch_optional(&self, sql: &str, params: &[&str]) -> DbResult<Option<Row>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    async fn count(&self, sql: &str, params: &[&str]) -> DbResult<u64> {
        let row = self.fetch_optional(sql, params).await?;
        Ok(row
            .and_then(|r| get_i64(&r, 0))
            .map(|c| c.max(0) as u64)
            .unwrap_or(0))
    }

    async fn list_objects(&self, sql: &str) -> DbResult<Vec<ObjectRef>> {
        let rows = self.fetch_all(sql, &[]).await?;
        Ok(rows
            .iter()
            .map(|row| ObjectRef::new(get_string(row, 0), get_string(row, 1)))
            .collect())
    }
}

#[async_trait]
impl DialectAdapter for SqlServerAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    async fn count_schemas(&self) -> DbResult<u64> {
        self.count(queries::COUNT_SCHEMAS, &[]).await
    }

    async fn count_tables(&self) -> DbResult<u64> {
        self.count(queries::COUNT_TABLES, &[]).await
    }

    async fn count_views(&self) -> DbResult<u64> {
        self.count(queries::COUNT_VIEWS, &[]).await
    }

    async fn database_size(&self) -> DbResult<Option<RawSize>> {
        let row = self.fetch_optional(queries::DATABASE_SIZE, &[]).await?;
        Ok(row
            .and_then(|r| get_i64(&r, 0))
            .filter(|pages| *pages >= 0)
            .map(|pages| RawSize::Pages(pages as u64)))
    }

    async fn list_tables(&self) -> DbResult<Vec<ObjectRef>> {
        let tables = self.list_objects(queries::LIST_TABLES).await?;
        debug!(count = tables.len(), "Listed SQL Server tables");
        Ok(tables)
    }

    async fn list_views(&self) -> DbResult<Vec<ObjectRef>> {
        let views = self.list_objects(queries::LIST_VIEWS).await?;
        debug!(count = views.len(), "Listed SQL Server views");
        Ok(views)
    }

    async fn table_exists(&self, table: &ObjectRef) -> DbResult<bool> {
        let count = self
            .count(queries::TABLE_EXISTS, &[&table.schema, &table.name])
            .await?;
        Ok(count > 0)
    }

    async fn table_stats(&self, table: &ObjectRef) -> DbResult<Option<RawTableStats>> {
        let row = self
            .fetch_optional(queries::TABLE_STATS, &[&table.schema, &table.name])
            .await?;

        Ok(row.map(|row| RawTableStats {
            row_estimate: get_i64(&row, 0).unwrap_or(0),
            size: get_i64(&row, 1)
                .filter(|pages| *pages >= 0)
                .map(|pages| RawSize::Pages(pages as u64)),
        }))
    }

    async fn table_columns(&self, table: &ObjectRef) -> DbResult<Vec<RawColumn>> {
        let rows = self
            .fetch_all(queries::TABLE_COLUMNS, &[&table.schema, &table.name])
            .await?;
        Ok(rows.iter().map(|row| column_from_row(row, 0)).collect())
    }

    async fn table_indexes(&self, table: &ObjectRef) -> DbResult<Vec<RawIndexColumn>> {
        let rows = self
            .fetch_all(queries::TABLE_INDEXES, &[&table.schema, &table.name])
            .await?;

        Ok(rows
            .iter()
            .map(|row| RawIndexColumn {
                index_name: get_string(row, 0),
                column_name: get_optional_string(row, 1),
                seq: get_i64(row, 2).unwrap_or(0),
                is_unique: get_bool(row, 3),
                is_primary: get_bool(row, 4),
                index_type: get_string(row, 5),
            })
            .collect())
    }

    async fn find_columns(&self, column_name: &str) -> DbResult<Vec<RawColumnMatch>> {
        let rows = self.fetch_all(queries::FIND_COLUMNS, &[column_name]).await?;
        Ok(rows
            .iter()
            .map(|row| RawColumnMatch {
                table: ObjectRef::new(get_string(row, 0), get_string(row, 1)),
                column: column_from_row(row, 2),
            })
            .collect())
    }

    async fn view_definition(&self, view: &ObjectRef) -> DbResult<Option<Option<String>>> {
        let row = self
            .fetch_optional(queries::VIEW_DEFINITION, &[&view.schema, &view.name])
            .await?;
        // definition is NULL for views created WITH ENCRYPTION
        Ok(row.map(|row| get_optional_string(&row, 0).filter(|d| !d.trim().is_empty())))
    }

    async fn close(&self) {
        // Dropping the last handle closes idle connections
        self.pool.write().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_login_auth_method() {
        let auth = SqlServerAuth::SqlLogin {
            username: "sa".into(),
            password: "secret".into(),
        };
        assert!(auth_method(&auth).is_ok());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_integrated_auth_unavailable_off_windows() {
        let err = auth_method(&SqlServerAuth::Integrated).unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.to_string().contains("Windows"));
    }
}
