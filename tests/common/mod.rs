//! Scripted in-memory dialect adapter shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use db_schema_explorer::db::{ConnectionSession, Connector, DialectAdapter};
use db_schema_explorer::error::{DbError, DbResult};
use db_schema_explorer::metadata::MetadataService;
use db_schema_explorer::models::{
    ConnectionDescriptor, DatabaseType, ObjectRef, RawColumn, RawColumnMatch, RawIndexColumn,
    RawSize, RawTableStats, ServerParams, SqlServerParams, ValidatedDescriptor,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub object: ObjectRef,
    pub row_estimate: i64,
    pub size: Option<RawSize>,
    pub columns: Vec<RawColumn>,
    pub indexes: Vec<RawIndexColumn>,
    /// Column queries fail with a database error
    pub broken: bool,
}

impl FakeTable {
    pub fn new(schema: &str, name: &str) -> Self {
        Self {
            object: ObjectRef::new(schema, name),
            row_estimate: 0,
            size: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            broken: false,
        }
    }

    pub fn rows(mut self, row_estimate: i64) -> Self {
        self.row_estimate = row_estimate;
        self
    }

    pub fn size(mut self, size: RawSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn column(mut self, name: &str, data_type: &str, nullable: &str) -> Self {
        self.columns.push(RawColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_nullable: nullable.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn raw_column(mut self, column: RawColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(
        mut self,
        index_name: &str,
        column: &str,
        seq: i64,
        is_unique: bool,
        is_primary: bool,
    ) -> Self {
        self.indexes.push(RawIndexColumn {
            index_name: index_name.to_string(),
            column_name: Some(column.to_string()),
            seq,
            is_unique,
            is_primary,
            index_type: "btree".to_string(),
        });
        self
    }

    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeCatalog {
    pub schemas: u64,
    pub size: Option<RawSize>,
    pub tables: Vec<FakeTable>,
    pub views: Vec<(ObjectRef, Option<String>)>,
}

impl FakeCatalog {
    fn table(&self, object: &ObjectRef) -> Option<&FakeTable> {
        self.tables.iter().find(|t| &t.object == object)
    }
}

/// A small shop database used by most tests.
pub fn sample_catalog() -> FakeCatalog {
    FakeCatalog {
        schemas: 2,
        size: Some(RawSize::Bytes(16 * 1024 * 1024)),
        tables: vec![
            FakeTable::new("public", "customers")
                .rows(1200)
                .size(RawSize::Bytes(65536))
                .column("id", "integer", "NO")
                .raw_column(RawColumn {
                    name: "name".to_string(),
                    data_type: "character varying".to_string(),
                    max_length: Some(255),
                    is_nullable: "YES".to_string(),
                    ..Default::default()
                })
                .raw_column(RawColumn {
                    name: "created_at".to_string(),
                    data_type: "timestamp without time zone".to_string(),
                    is_nullable: "NO".to_string(),
                    default_value: Some("now()".to_string()),
                    ..Default::default()
                })
                .index("customers_pkey", "id", 1, true, true)
                .index("idx_customers_name", "name", 1, false, false),
            FakeTable::new("public", "orders")
                .rows(-1)
                .column("id", "integer", "NO")
                .column("customer_id", "integer", "YES")
                .index("orders_pkey", "id", 1, true, true)
                .index("idx_orders_customer", "id", 2, false, false)
                .index("idx_orders_customer", "customer_id", 1, false, false),
            FakeTable::new("public", "orders_archive").column("id", "integer", "NO"),
            FakeTable::new("public", "empty_table"),
            FakeTable::new("audit", "locked").broken(),
        ],
        views: vec![
            (
                ObjectRef::new("public", "active_customers"),
                Some("SELECT * FROM public.customers WHERE active".to_string()),
            ),
            (
                ObjectRef::new("public", "order_summary"),
                Some(
                    "SELECT c.name, count(*) FROM active_customers c \
                     JOIN orders o ON o.customer_id = c.id GROUP BY c.name"
                        .to_string(),
                ),
            ),
            (
                ObjectRef::new("public", "external_report"),
                Some("SELECT * FROM other.missing".to_string()),
            ),
            (ObjectRef::new("public", "hidden"), None),
            (
                ObjectRef::new("public", "broken_view"),
                Some("this is not valid sql".to_string()),
            ),
        ],
    }
}

/// Open/close bookkeeping shared by a connector and every adapter it creates.
#[derive(Debug, Default)]
pub struct Counters {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Adapters opened and not yet closed.
    pub fn live(&self) -> usize {
        self.connects() - self.closes()
    }
}

#[derive(Debug)]
pub struct FakeAdapter {
    db_type: DatabaseType,
    catalog: Arc<Mutex<FakeCatalog>>,
    query_delay: Duration,
    counters: Arc<Counters>,
    closed: AtomicBool,
}

impl FakeAdapter {
    async fn pause(&self) {
        if !self.query_delay.is_zero() {
            tokio::time::sleep(self.query_delay).await;
        }
    }

    fn snapshot(&self) -> FakeCatalog {
        self.catalog.lock().unwrap().clone()
    }
}

#[async_trait]
impl DialectAdapter for FakeAdapter {
    fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    fn server_version(&self) -> Option<&str> {
        Some("fake-1.0")
    }

    async fn count_schemas(&self) -> DbResult<u64> {
        self.pause().await;
        Ok(self.snapshot().schemas)
    }

    async fn count_tables(&self) -> DbResult<u64> {
        self.pause().await;
        Ok(self.snapshot().tables.len() as u64)
    }

    async fn count_views(&self) -> DbResult<u64> {
        self.pause().await;
        Ok(self.snapshot().views.len() as u64)
    }

    async fn database_size(&self) -> DbResult<Option<RawSize>> {
        self.pause().await;
        Ok(self.snapshot().size)
    }

    async fn list_tables(&self) -> DbResult<Vec<ObjectRef>> {
        self.pause().await;
        Ok(self
            .snapshot()
            .tables
            .into_iter()
            .map(|t| t.object)
            .collect())
    }

    async fn list_views(&self) -> DbResult<Vec<ObjectRef>> {
        self.pause().await;
        Ok(self.snapshot().views.into_iter().map(|(v, _)| v).collect())
    }

    async fn table_exists(&self, table: &ObjectRef) -> DbResult<bool> {
        self.pause().await;
        Ok(self.snapshot().table(table).is_some())
    }

    async fn table_stats(&self, table: &ObjectRef) -> DbResult<Option<RawTableStats>> {
        self.pause().await;
        Ok(self.snapshot().table(table).map(|t| RawTableStats {
            row_estimate: t.row_estimate,
            size: t.size,
        }))
    }

    async fn table_columns(&self, table: &ObjectRef) -> DbResult<Vec<RawColumn>> {
        self.pause().await;
        match self.snapshot().table(table) {
            Some(t) if t.broken => Err(DbError::database(
                "permission denied for table",
                Some("42501".to_string()),
            )),
            Some(t) => Ok(t.columns.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn table_indexes(&self, table: &ObjectRef) -> DbResult<Vec<RawIndexColumn>> {
        self.pause().await;
        Ok(self
            .snapshot()
            .table(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }

    async fn find_columns(&self, column_name: &str) -> DbResult<Vec<RawColumnMatch>> {
        self.pause().await;
        let mut hits = Vec::new();
        for table in self.snapshot().tables {
            for column in &table.columns {
                if column.name.eq_ignore_ascii_case(column_name) {
                    hits.push(RawColumnMatch {
                        table: table.object.clone(),
                        column: column.clone(),
                    });
                }
            }
        }
        Ok(hits)
    }

    async fn view_definition(&self, view: &ObjectRef) -> DbResult<Option<Option<String>>> {
        self.pause().await;
        Ok(self
            .snapshot()
            .views
            .into_iter()
            .find(|(v, _)| v == view)
            .map(|(_, definition)| definition))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Connector handing out [`FakeAdapter`]s over one shared catalog.
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub catalog: Arc<Mutex<FakeCatalog>>,
    pub counters: Arc<Counters>,
    pub connect_delay: Duration,
    pub query_delay: Duration,
    reject: AtomicBool,
}

impl FakeConnector {
    pub fn new(catalog: FakeCatalog) -> Self {
        Self {
            catalog: Arc::new(Mutex::new(catalog)),
            ..Default::default()
        }
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    /// Make subsequent connects fail as if the credentials were wrong.
    pub fn reject_logins(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Drop a table behind the service's back.
    pub fn drop_table(&self, schema: &str, name: &str) {
        let object = ObjectRef::new(schema, name);
        self.catalog
            .lock()
            .unwrap()
            .tables
            .retain(|t| t.object != object);
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        descriptor: &ValidatedDescriptor,
    ) -> DbResult<Box<dyn DialectAdapter>> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(DbError::connection(
                "password authentication failed for user \"u\"",
                "Verify the username and password",
            ));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAdapter {
            db_type: descriptor.db_type(),
            catalog: self.catalog.clone(),
            query_delay: self.query_delay,
            counters: self.counters.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Session and metadata service over a fake connector.
pub fn service_with(connector: Arc<FakeConnector>) -> (ConnectionSession, MetadataService) {
    let session = ConnectionSession::new(connector, CONNECT_TIMEOUT);
    let metadata = MetadataService::new(session.clone(), QUERY_TIMEOUT);
    (session, metadata)
}

pub fn postgres_descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::Postgres(ServerParams {
        host: Some("localhost".to_string()),
        port: Some(5432),
        database: Some("app".to_string()),
        username: Some("u".to_string()),
        password: Some("p".to_string()),
    })
}

pub fn mysql_descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::MySql(ServerParams {
        host: Some("localhost".to_string()),
        port: Some(3306),
        database: Some("shop".to_string()),
        username: Some("root".to_string()),
        password: Some("secret".to_string()),
    })
}

pub fn sqlserver_trusted_descriptor() -> ConnectionDescriptor {
    ConnectionDescriptor::SqlServer(SqlServerParams {
        server: Some("SRV".to_string()),
        database: Some("app".to_string()),
        trusted_connection: Some(true),
        ..Default::default()
    })
}
