//! PostgreSQL dialect adapter.
//!
//! Metadata comes from `information_schema` for names and columns and from
//! `pg_catalog` for statistics, sizes and index layout.

use crate::db::adapter::{DialectAdapter, PoolSettings, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{
    DatabaseType, ObjectRef, RawColumn, RawColumnMatch, RawIndexColumn, RawSize, RawTableStats,
    ServerTarget,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{debug, warn};

mod queries {
    pub const SERVER_VERSION: &str = "SHOW server_version";

    pub const COUNT_SCHEMAS: &str = r#"
        SELECT COUNT(*) FROM information_schema.schemata
        "#;

    pub const COUNT_TABLES: &str = r#"
        SELECT COUNT(*)
        FROM information_schema.tables
        WHERE table_type = 'BASE TABLE'
          AND table_schema NOT IN ('pg_catalog', 'information_schema')
          AND table_schema NOT LIKE 'pg_toast%'
        "#;

    pub const COUNT_VIEWS: &str = r#"
        SELECT COUNT(*)
        FROM information_schema.views
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        "#;

    pub const DATABASE_SIZE: &str = "SELECT pg_database_size(current_database())";

    pub const LIST_TABLES: &str = r#"
        SELECT table_schema::text AS table_schema, table_name::text AS table_name
        FROM information_schema.tables
        WHERE table_type = 'BASE TABLE'
          AND table_schema NOT IN ('pg_catalog', 'information_schema')
          AND table_schema NOT LIKE 'pg_toast%'
        ORDER BY table_schema, table_name
        "#;

    pub const LIST_VIEWS: &str = r#"
        SELECT table_schema::text AS table_schema, table_name::text AS table_name
        FROM information_schema.views
        WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY table_schema, table_name
        "#;

    pub const TABLE_EXISTS: &str = r#"
        SELECT EXISTS (
            SELECT 1
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p', 'f')
        )
        "#;

    pub const TABLE_STATS: &str = r#"
        SELECT
            c.reltuples::bigint AS row_estimate,
            pg_total_relation_size(c.oid) AS total_size
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p', 'f')
        "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT
            column_name::text AS column_name,
            data_type::text AS data_type,
            character_maximum_length::bigint AS max_length,
            CASE WHEN data_type = 'numeric' THEN numeric_precision::bigint END AS numeric_precision,
            CASE WHEN data_type = 'numeric' THEN numeric_scale::bigint END AS numeric_scale,
            is_nullable::text AS is_nullable,
            column_default::text AS column_default
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = $2
        ORDER BY ordinal_position
        "#;

    pub const TABLE_INDEXES: &str = r#"
        SELECT
            i.relname::text AS index_name,
            a.attname::text AS column_name,
            k.ord::bigint AS seq,
            ix.indisunique AS is_unique,
            ix.indisprimary AS is_primary,
            am.amname::text AS index_type
        FROM pg_index ix
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_am am ON am.oid = i.relam
        CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
        LEFT JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
        WHERE n.nspname = $1 AND t.relname = $2
          AND k.ord <= ix.indnkeyatts
        ORDER BY i.relname, k.ord
        "#;

    pub const FIND_COLUMNS: &str = r#"
        SELECT
            c.table_schema::text AS table_schema,
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            c.character_maximum_length::bigint AS max_length,
            CASE WHEN c.data_type = 'numeric' THEN c.numeric_precision::bigint END AS numeric_precision,
            CASE WHEN c.data_type = 'numeric' THEN c.numeric_scale::bigint END AS numeric_scale,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema AND t.table_name = c.table_name
        WHERE lower(c.column_name) = lower($1)
          AND t.table_type = 'BASE TABLE'
          AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
        ORDER BY c.table_schema, c.table_name
        "#;

    pub const VIEW_DEFINITION: &str = r#"
        SELECT pg_get_viewdef(c.oid, true) AS definition
        FROM pg_class c
        JOIN pg_namespace n ON n.oid = c.relnamespace
        WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('v', 'm')
        "#;
}

#[derive(Debug)]
pub struct PostgresAdapter {
    pool: PgPool,
    server_version: Option<String>,
}

impl PostgresAdapter {
    /// Open a pool against `target` and verify it with a round trip.
    pub async fn connect(target: &ServerTarget, settings: &PoolSettings) -> DbResult<Self> {
        let options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database)
            .username(&target.username)
            .password(&target.password)
            .application_name("db-schema-explorer");

        let pool = PgPoolOptions::new()
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
                    connection_suggestion(DatabaseType::PostgreSQL, &e.to_string()),
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
                    row.get::<String, _>("table_schema"),
                    row.get::<String, _>("table_name"),
                )
            })
            .collect())
    }
}

fn column_from_row(row: &sqlx::postgres::PgRow) -> RawColumn {
    RawColumn {
        name: row.get("column_name"),
        data_type: row.get("data_type"),
        max_length: row.try_get("max_length").ok().flatten(),
        numeric_precision: row.try_get("numeric_precision").ok().flatten(),
        numeric_scale: row.try_get("numeric_scale").ok().flatten(),
        is_nullable: row.get("is_nullable"),
        default_value: row.try_get("column_default").ok().flatten(),
    }
}

#[async_trait]
impl DialectAdapter for PostgresAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
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
        let size: Option<i64> = sqlx::query_scalar(queries::DATABASE_SIZE)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(size.filter(|s| *s >= 0).map(|s| RawSize::Bytes(s as u64)))
    }

    async fn list_tables(&self) -> DbResult<Vec<ObjectRef>> {
        let tables = self.list_objects(queries::LIST_TABLES).await?;
        debug!(count = tables.len(), "Listed PostgreSQL tables");
        Ok(tables)
    }

    async fn list_views(&self) -> DbResult<Vec<ObjectRef>> {
        let views = self.list_objects(queries::LIST_VIEWS).await?;
        debug!(count = views.len(), "Listed PostgreSQL views");
        Ok(views)
    }

    async fn table_exists(&self, table: &ObjectRef) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar(queries::TABLE_EXISTS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;
        Ok(exists)
    }

    async fn table_stats(&self, table: &ObjectRef) -> DbResult<Option<RawTableStats>> {
        let row = sqlx::query(queries::TABLE_STATS)
            .bind(&table.schema)
            .bind(&table.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| self.driver_error(e))?;

        Ok(row.map(|row| {
            let row_estimate: i64 = row.try_get("row_estimate").unwrap_or(-1);
            let size: Option<i64> = row.try_get("total_size").ok().flatten();
            RawTableStats {
                row_estimate,
                size: size.filter(|s| *s >= 0).map(|s| RawSize::Bytes(s as u64)),
            }
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
            .map(|row| RawIndexColumn {
                index_name: row.get("index_name"),
                column_name: row.try_get("column_name").ok().flatten(),
                seq: row.get("seq"),
                is_unique: row.get("is_unique"),
                is_primary: row.get("is_primary"),
                index_type: row.get("index_type"),
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
                    row.get::<String, _>("table_schema"),
                    row.get::<String, _>("table_name"),
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
        Ok(row.map(|row| {
            row.try_get::<Option<String>, _>("definition")
                .ok()
                .flatten()
                .filter(|d| !d.trim().is_empty())
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
