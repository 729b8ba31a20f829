//! Data models for sql-ext.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;
pub mod table;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, ConnectionConfigError, DEFAULT_CONNECT_TIMEOUT_SECS, DatabaseType,
};
pub use query::{
    ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS, MAX_QUERY_TIMEOUT_SECS, NamedParam, QueryParam,
    TransactionData, TransactionSummary, validate_sql,
};
pub use table::{DataRow, DataTable};
