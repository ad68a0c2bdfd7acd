//! Database layer.
//!
//! This module contains the dialect adapters and the process-wide session
//! that owns the single live adapter.

pub mod adapter;
pub mod mysql;
pub mod postgres;
pub mod session;
pub mod sqlserver;

pub use adapter::{Connector, DialectAdapter, NativeConnector, PoolSettings};
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use session::{ActiveSession, ConnectionSession, SessionHandle};
pub use sqlserver::SqlServerAdapter;
