//! MySQL / MariaDB dialect adapter.
//!
//! Everything is answered from `information_schema`. Row counts come from
//! `TABLES.TABLE_ROWS`, which InnoDB maintains as an estimate.

use crate::db::adapter::{DialectAdapter, PoolSettings, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{
    DatabaseType, ObjectRef, RawColumn, RawColumnMatch, RawIndexColumn, RawSize, RawTableStats,
    ServerTarget,
};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::{MySqlPool, Row};
use tracing::{debug, warn};

mod queries {
    pub const SERVER_VERSION: &str = "SELECT version()";

    pub const COUNT_SCHEMAS: &str = r#"
        SELECT COUNT(*) FROM information_schema.SCHEMATA
        "#;

    pub const COUNT_TABLES: &str = r#"
        SELECT COUNT(*)
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'BASE TABLE'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const COUNT_VIEWS: &str = r#"
        SELECT COUNT(*)
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'VIEW'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        "#;

    pub const DATABASE_SIZE: &str = r#"
        SELECT CAST(SUM(COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0)) AS UNSIGNED) AS size_bytes
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        "#;

    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_SCHEMA, TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'BASE TABLE'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT TABLE_SCHEMA, TABLE_NAME
        FROM information_schema.TABLES
        WHERE TABLE_TYPE = 'VIEW'
          AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT COUNT(*)
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'
        "#;

    pub const TABLE_STATS: &str = r#"
        SELECT
            CAST(COALESCE(TABLE_ROWS, 0) AS SIGNED) AS row_estimate,
            CAST(COALESCE(DATA_LENGTH, 0) + COALESCE(INDEX_LENGTH, 0) AS UNSIGNED) AS total_size
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND TABLE_TYPE = 'BASE TABLE'
        "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
        "#;

    pub const TABLE_INDEXES: &str = r#"
        SELECT
            INDEX_NAME,
            COLUMN_NAME,
            CAST(SEQ_IN_INDEX AS SIGNED) AS SEQ_IN_INDEX,
            CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE,
            INDEX_TYPE
        FROM information_schema.STATISTICS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

    pub const FIND_COLUMNS: &str = r#"
        SELECT c.TABLE_SCHEMA, c.TABLE_NAME, c.COLUMN_NAME, c.COLUMN_TYPE, c.IS_NULLABLE, c.COLUMN_DEFAULT
        FROM information_schema.COLUMNS c
        JOIN information_schema.TABLES t
          ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
        WHERE LOWER(c.COLUMN_NAME) = LOWER(?)
          AND t.TABLE_TYPE = 'BASE TABLE'
          AND c.TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        ORDER BY c.TABLE_SCHEMA, c.TABLE_NAME
        "#;

    pub const VIEW_DEFINITION: &str = r#"
        SELECT VIEW_DEFINITION
        FROM information_schema.VIEWS
        WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;
}

/// Try to get a u64 value from a row, handling MySQL version differences.
/// MySQL 5.x may return BIGINT (i64), MySQL 8.x returns BIGINT UNSIGNED (u64).
fn try_get_u64(row: &MySqlRow, column: &str) -> Option<u64> {
    if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(column) {
        return Some(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(column) {
        return Some(v.max(0) as u64);
    }
    None
}

/// Safely get a string from a MySQL row.
/// MySQL may return VARBINARY instead of VARCHAR depending on charset configuration.
fn get_string(row: &MySqlRow, column: &str) -> String {
    get_optional_string(row, column).unwrap_or_default()
}

fn get_optional_string(row: &MySqlRow, column: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .or_else(|| {
            row.try_get::<Option<Vec<u8>>, _>(column)
                .ok()
                .flatten()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
}

fn column_from_row(row: &MySqlRow) -> RawColumn {
    RawColumn {
        name: get_string(row, "COLUMN_NAME"),
        // COLUMN_TYPE already carries length and precision, e.g. `varchar(255)`
        data_type: get_string(row, "COLUMN_TYPE"),
        max_length: None,
        numeric_precision: None,
        numeric_scale: None,
        is_nullable: get_string(row, "IS_NULLABLE"),
        default_value: get_optional_string(row, "COLUMN_DEFAULT"),
    }
}

#[derive(Debug)]
pub struct MySqlAdapter {
    pool: MySqlPool,
    server_version: Option<String>,
}

impl MySqlAdapter {
    /// Open a pool against `target` and verify it with a round trip.
    pub async fn connect(target: &ServerTarget, settings: &PoolSettings) -> DbResult<Self> {
        let options = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database)
            .username(&target.username)
            .password(&target.password)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .min_connections(1)
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .idle_timeout(Some(settings.idle_timeout))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(|e| {
                DbError::connection(
                    format!("Failed to connect: {}", e),
                    connection_suggestion(DatabaseType::MySQL, &e.to_string()),
                )
            })?;

        let server_version = match sqlx::query_scalar::<_, String>(queries::SERVER_VERSION)
            .fetch_one(&pool)
            .await
        {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        };

        Ok(Self {
            pool,
            server_version,
        })
    }

    /// Map driver errors, reporting pool exhaustion against the configured acquire limit.
    fn driver_error(&self, err: sqlx::Error) -> DbError {
        DbError::from_sqlx(err, self.pool.options().get_acquire_timeout())
    }

    async fn count(&self, sql: &str) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(count.max(0) as u64)
    }

    async fn list_objects(&self, sql: &str) -> DbResult<Vec<ObjectRef>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(rows
            .iter()
            .map(|row| {
                ObjectRef::new(
                    get_string(row, "TABLE_SCHEMA"),
                    get_string(row, "TABLE_NAME"),
                )
            })
            .collect())
    }
}

#[async_trait]
impl DialectAdapter for MySqlAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    async fn count_schemas(&self) -> DbResult<u64> {
        self.count(queries::COUNT_SCHEMAS).await
    }

    async fn count_tables(&self) -> DbResult<u64> {
        self.count(queries::COUNT_TABLES).await
    }

    async fn count_views(&self) -> DbResult<u64> {
        self.count(queries::COUNT_VIEWS).await
    }

    async fn database_size(&self) -> DbResult<Option<RawSize>> {
        let row = sqlx::query(queries::DATABASE_SIZE)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(try_get_u64(&row, "size_bytes").map(RawSize::Bytes))
    }

    async fn list_tables(&self) -> DbResult<Vec<ObjectRef>> {
        let tables = self.list_objects(queries::LIST_TABLES).await?;
        debug!(count = tables.len(), "Listed MySQL tables");
        Ok(tables)
    }

    async fn list_views(&self) -> DbResult<Vec<ObjectRef>> {
        let views = self.list_objects(queries::LIST_VIEWS).await?;
        debug!(count = views.len(), "Listed MySQL views");
        Ok(views)
    }

    async fn table_exists(&self, table: &ObjectRef) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(queries::TABLE_EXISTS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(count > 0)
    }

    async fn table_stats(&self, table: &ObjectRef) -> DbResult<Option<RawTableStats>> {
        let row = sqlx::query(queries::TABLE_STATS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;

        Ok(row.map(|row| RawTableStats {
            row_estimate: row.try_get::<i64, _>("row_estimate").unwrap_or(0),
            size: try_get_u64(&row, "total_size").map(RawSize::Bytes),
        }))
    }

    async fn table_columns(&self, table: &ObjectRef) -> DbResult<Vec<RawColumn>> {
        let rows = sqlx::query(queries::TABLE_COLUMNS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(rows.iter().map(column_from_row).collect())
    }

    async fn table_indexes(&self, table: &ObjectRef) -> DbResult<Vec<RawIndexColumn>> {
        let rows = sqlx::query(queries::TABLE_INDEXES)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let index_name = get_string(row, "INDEX_NAME");
                let non_unique: i64 = row.try_get("NON_UNIQUE").unwrap_or(1);
                let is_primary = index_name == "PRIMARY";
                RawIndexColumn {
                    column_name: get_optional_string(row, "COLUMN_NAME"),
                    seq: row.try_get("SEQ_IN_INDEX").unwrap_or(0),
                    is_unique: non_unique == 0 || is_primary,
                    is_primary,
                    index_type: get_string(row, "INDEX_TYPE"),
                    index_name,
                }
            })
            .collect())
    }

    async fn find_columns(&self, column_name: &str) -> DbResult<Vec<RawColumnMatch>> {
        let rows = sqlx::query(queries::FIND_COLUMNS)
            .bind(column_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;

        Ok(rows
            .iter()
            .map(|row| RawColumnMatch {
                table: ObjectRef::new(
                    get_string(row, "TABLE_SCHEMA"),
                    get_string(row, "TABLE_NAME"),
                ),
                column: column_from_row(row),
            })
            .collect())
    }

    async fn view_definition(&self, view: &ObjectRef) -> DbResult<Option<Option<String>>> {
        let row = sqlx::query(queries::VIEW_DEFINITION)
            .bind(&view.schema)
            .bind(&view.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        // Empty when the current user lacks SHOW VIEW on the view
        Ok(row.map(|row| {
            get_optional_string(&row, "VIEW_DEFINITION").filter(|d| !d.trim().is_empty())
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
