//! sql-ext library
//!
//! Execution helpers for MySQL and SQL Server: non-query, query-to-table,
//! forward-only cursors, scalars and transactional batches, each available
//! asynchronously (`DatabaseCaller`) and synchronously (`BlockingCaller`).
//!
//! The engine-specific extension traits (`db::MySqlExt`, `db::MsSqlExt`) can
//! also be used directly on a raw sqlx connection or tiberius client.

pub mod blocking;
pub mod caller;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;

pub use blocking::{BlockingCaller, BlockingReader};
pub use caller::DatabaseCaller;
pub use config::Config;
pub use db::{DataReader, ExecutionGuard, Provider, SqlProvider};
pub use error::{DbError, DbResult};
pub use models::{
    ConnectionConfig, DataRow, DataTable, DatabaseType, NamedParam, QueryParam, TransactionData,
    TransactionSummary,
};
