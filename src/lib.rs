//! DB Schema Explorer Library
//!
//! This library attaches to one PostgreSQL, MySQL or SQL Server database at a
//! time and reports its structural metadata (counts, tables, views, columns,
//! indexes, sizes) in one normalized shape regardless of the engine.

pub mod config;
pub mod db;
pub mod error;
pub mod metadata;
pub mod models;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use metadata::MetadataService;
