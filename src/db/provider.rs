//! Uniform provider interface over both engines.
//!
//! `SqlProvider` is the engine-independent surface: every operation takes
//! SQL plus positional parameters and returns engine-neutral results
//! (`DataTable`, `DataReader`, JSON scalar). `MySqlProvider` and
//! `MsSqlProvider` own one connection each; `Provider` picks one at runtime
//! from the connection string.

use crate::db::cursor::DataReader;
use crate::db::guard::ExecutionGuard;
use crate::db::mssql::{self, MsSqlClient, MsSqlExt};
use crate::db::mysql::{self, MySqlConnection, MySqlExt};
use crate::db::types::RowToValues;
use crate::error::{DbError, DbResult};
use crate::impl_provider_dispatch;
use crate::models::{
    ConnectionConfig, DataTable, DatabaseType, QueryParam, TransactionData, TransactionSummary,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;

#[async_trait]
pub trait SqlProvider: Send {
    fn db_type(&self) -> DatabaseType;

    /// Run a statement that returns no rows; yields the affected row count.
    async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    /// Run `batch` in one transaction, applying `guard` to each statement.
    async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
        guard: &ExecutionGuard,
    ) -> DbResult<TransactionSummary>;

    async fn execute_query_table(&mut self, sql: &str, params: &[QueryParam])
    -> DbResult<DataTable>;

    async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>>;

    /// First field of the first row; `Null` when there is no row.
    async fn execute_scalar_value(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue>;

    /// Close the connection gracefully.
    async fn close(self) -> DbResult<()>
    where
        Self: Sized;
}

/// First cell of an optional row as JSON.
fn first_value<R: RowToValues>(row: Option<&R>) -> JsonValue {
    row.and_then(|r| r.to_values().into_iter().next())
        .unwrap_or(JsonValue::Null)
}

// =============================================================================
// MySQL
// =============================================================================

pub struct MySqlProvider {
    conn: MySqlConnection,
}

impl MySqlProvider {
    pub fn new(conn: MySqlConnection) -> Self {
        Self { conn }
    }

    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Ok(Self::new(mysql::connect(config).await?))
    }

    /// Direct access to the underlying connection.
    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }
}

#[async_trait]
impl SqlProvider for MySqlProvider {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.conn.execute_non_query(sql, params).await
    }

    async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
        guard: &ExecutionGuard,
    ) -> DbResult<TransactionSummary> {
        self.conn.execute_transaction_guarded(batch, guard).await
    }

    async fn execute_query_table(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<DataTable> {
        self.conn.execute_query_table(sql, params).await
    }

    async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>> {
        let cursor = self.conn.execute_query_reader(sql, params).await?;
        Ok(cursor.into_data_reader())
    }

    async fn execute_scalar_value(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        let mut cursor = self.conn.execute_query_reader(sql, params).await?;
        if !cursor.read().await? {
            return Ok(JsonValue::Null);
        }
        Ok(first_value(cursor.row().ok()))
    }

    async fn close(self) -> DbResult<()> {
        use sqlx::Connection;
        self.conn.close().await.map_err(DbError::from)
    }
}

// =============================================================================
// SQL Server
// =============================================================================

pub struct MsSqlProvider {
    client: MsSqlClient,
}

impl MsSqlProvider {
    pub fn new(client: MsSqlClient) -> Self {
        Self { client }
    }

    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Ok(Self::new(mssql::connect(config).await?))
    }

    /// Direct access to the underlying client.
    pub fn client(&mut self) -> &mut MsSqlClient {
        &mut self.client
    }
}

#[async_trait]
impl SqlProvider for MsSqlProvider {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MsSql
    }

    async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.client.execute_non_query(sql, params).await
    }

    async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
        guard: &ExecutionGuard,
    ) -> DbResult<TransactionSummary> {
        self.client.execute_transaction_guarded(batch, guard).await
    }

    async fn execute_query_table(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<DataTable> {
        self.client.execute_query_table(sql, params).await
    }

    async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>> {
        let cursor = self.client.execute_query_reader(sql, params).await?;
        Ok(cursor.into_data_reader())
    }

    async fn execute_scalar_value(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        let mut cursor = self.client.execute_query_reader(sql, params).await?;
        if !cursor.read().await? {
            return Ok(JsonValue::Null);
        }
        Ok(first_value(cursor.row().ok()))
    }

    async fn close(self) -> DbResult<()> {
        self.client.close().await.map_err(DbError::from)
    }
}

// =============================================================================
// Runtime selection
// =============================================================================

/// A provider for whichever engine the connection string names.
pub enum Provider {
    MySql(MySqlProvider),
    MsSql(MsSqlProvider),
}

impl Provider {
    /// Connect to the database described by `config`.
    pub async fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        let provider = match config.db_type {
            DatabaseType::MySQL => Provider::MySql(MySqlProvider::connect(config).await?),
            DatabaseType::MsSql => Provider::MsSql(MsSqlProvider::connect(config).await?),
        };
        info!(db_type = %config.db_type, "Provider connected");
        Ok(provider)
    }
}

#[async_trait]
impl SqlProvider for Provider {
    fn db_type(&self) -> DatabaseType {
        impl_provider_dispatch!(self, p => p.db_type())
    }

    async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        impl_provider_dispatch!(self, p => p.execute_non_query(sql, params).await)
    }

    async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
        guard: &ExecutionGuard,
    ) -> DbResult<TransactionSummary> {
        impl_provider_dispatch!(self, p => p.execute_transaction(batch, guard).await)
    }

    async fn execute_query_table(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<DataTable> {
        impl_provider_dispatch!(self, p => p.execute_query_table(sql, params).await)
    }

    async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>> {
        impl_provider_dispatch!(self, p => p.execute_query_reader(sql, params).await)
    }

    async fn execute_scalar_value(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        impl_provider_dispatch!(self, p => p.execute_scalar_value(sql, params).await)
    }

    async fn close(self) -> DbResult<()> {
        impl_provider_dispatch!(self, {
            MySql(p) => p.close().await,
            MsSql(p) => p.close().await,
        })
    }
}
