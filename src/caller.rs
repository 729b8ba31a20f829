//! High-level caller over a single provider.
//!
//! `DatabaseCaller` owns an open provider and runs every operation through
//! its `ExecutionGuard`, so a timeout or a cancellation set on the caller
//! applies to all calls made with it.
//!
//! # Example
//!
//! ```ignore
//! let config = ConnectionConfig::new("mysql://root:pw@localhost/app")?;
//! let mut caller = DatabaseCaller::connect(&config).await?
//!     .with_timeout(Duration::from_secs(30));
//!
//! let count: i64 = caller
//!     .execute_scalar("SELECT COUNT(*) FROM orders WHERE status = ?", &["open".into()], 0)
//!     .await?;
//! caller.close().await?;
//! ```

use crate::db::{DataReader, ExecutionGuard, Provider, SqlProvider};
use crate::error::DbResult;
use crate::models::table::convert_value;
use crate::models::{
    ConnectionConfig, DataTable, DatabaseType, QueryParam, TransactionData, TransactionSummary,
};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct DatabaseCaller<P: SqlProvider = Provider> {
    provider: P,
    guard: ExecutionGuard,
}

impl DatabaseCaller<Provider> {
    /// Connect to the database named by `config`.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Ok(Self::new(Provider::connect(config).await?))
    }
}

impl<P: SqlProvider> DatabaseCaller<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            guard: ExecutionGuard::none(),
        }
    }

    /// Fail any single call that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.guard = self.guard.with_timeout(timeout);
        self
    }

    /// Abort the in-flight call when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.guard = self.guard.with_cancellation(token);
        self
    }

    pub fn with_guard(mut self, guard: ExecutionGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &ExecutionGuard {
        &self.guard
    }

    pub fn db_type(&self) -> DatabaseType {
        self.provider.db_type()
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let rows = self
            .guard
            .run("non-query", self.provider.execute_non_query(sql, params))
            .await?;
        debug!(rows_affected = rows, "Non-query complete");
        Ok(rows)
    }

    /// Run `batch` in one transaction; see `db::transaction` for the rules.
    pub async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
    ) -> DbResult<TransactionSummary> {
        self.provider.execute_transaction(batch, &self.guard).await
    }

    pub async fn execute_query_table(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<DataTable> {
        self.guard
            .run("query", self.provider.execute_query_table(sql, params))
            .await
    }

    /// Open a cursor. The caller's guard also applies to each `read()`.
    pub async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>> {
        let guard = self.guard.clone();
        let reader = guard
            .run("open cursor", self.provider.execute_query_reader(sql, params))
            .await?;
        Ok(reader.with_guard(guard))
    }

    /// First field of the first row as `T`, or `default` when there is no
    /// row or the value is NULL.
    pub async fn execute_scalar<T: DeserializeOwned>(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        default: T,
    ) -> DbResult<T> {
        let value = self
            .guard
            .run("scalar", self.provider.execute_scalar_value(sql, params))
            .await?;
        convert_value(&value, "<scalar>", default)
    }

    /// Close the underlying connection.
    pub async fn close(self) -> DbResult<()> {
        debug!(db_type = %self.provider.db_type(), "Closing connection");
        self.provider.close().await
    }
}
