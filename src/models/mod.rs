//! Data models for the schema explorer.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod schema;

// Re-export commonly used types
pub use connection::{
    ConnectionDescriptor, DatabaseType, ServerParams, ServerTarget, SessionInfo, SqlServerAuth,
    SqlServerParams, SqlServerTarget, ValidatedDescriptor,
};
pub use schema::{
    ColumnInfo, ColumnMatch, ColumnSearchResult, DatabaseOverview, DependencyEdge,
    DependencyNode, IndexColumns, IndexInfo, NodeKind, Nullability, ObjectRef, RawColumn,
    RawColumnMatch, RawIndexColumn, RawSize, RawTableStats, SimilarGroup, SimilarTables,
    TableDetails, TableIndexes, TableRef, ViewDefinition, ViewDependencies, ViewRef,
};
