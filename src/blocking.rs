//! Synchronous variants of every operation.
//!
//! `BlockingCaller` drives a `DatabaseCaller` on its own current-thread
//! tokio runtime. It must not be created or used from inside another tokio
//! runtime; tokio panics when `block_on` is nested.

use crate::caller::DatabaseCaller;
use crate::db::{DataReader, ExecutionGuard, Provider, SqlProvider};
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, DataRow, DataTable, DatabaseType, QueryParam, TransactionData,
    TransactionSummary,
};
use serde::de::DeserializeOwned;
use tokio::runtime::{Builder, Handle, Runtime};

pub struct BlockingCaller<P: SqlProvider = Provider> {
    runtime: Runtime,
    caller: DatabaseCaller<P>,
}

fn build_runtime() -> DbResult<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))
}

impl BlockingCaller<Provider> {
    /// Connect to the database named by `config`.
    pub fn connect(config: &ConnectionConfig) -> DbResult<Self> {
        Self::connect_with(config, ExecutionGuard::none())
    }

    /// Connect and apply `guard` to every later call.
    pub fn connect_with(config: &ConnectionConfig, guard: ExecutionGuard) -> DbResult<Self> {
        let runtime = build_runtime()?;
        let caller = runtime.block_on(DatabaseCaller::connect(config))?;
        Ok(Self {
            runtime,
            caller: caller.with_guard(guard),
        })
    }
}

impl<P: SqlProvider> BlockingCaller<P> {
    /// Wrap an existing provider.
    pub fn new(provider: P) -> DbResult<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            caller: DatabaseCaller::new(provider),
        })
    }

    pub fn with_guard(mut self, guard: ExecutionGuard) -> Self {
        self.caller = self.caller.with_guard(guard);
        self
    }

    /// Handle to the internal runtime, e.g. to spawn a signal listener.
    ///
    /// Spawned tasks only make progress while a blocking call is running.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.caller.db_type()
    }

    pub fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.runtime
            .block_on(self.caller.execute_non_query(sql, params))
    }

    pub fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
    ) -> DbResult<TransactionSummary> {
        self.runtime.block_on(self.caller.execute_transaction(batch))
    }

    pub fn execute_query_table(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<DataTable> {
        self.runtime
            .block_on(self.caller.execute_query_table(sql, params))
    }

    pub fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<BlockingReader<'c>> {
        let reader = self
            .runtime
            .block_on(self.caller.execute_query_reader(sql, params))?;
        Ok(BlockingReader {
            runtime: &self.runtime,
            reader,
        })
    }

    pub fn execute_scalar<T: DeserializeOwned>(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        default: T,
    ) -> DbResult<T> {
        self.runtime
            .block_on(self.caller.execute_scalar(sql, params, default))
    }

    pub fn close(self) -> DbResult<()> {
        let Self { runtime, caller } = self;
        runtime.block_on(caller.close())
    }
}

/// Synchronous forward-only cursor.
pub struct BlockingReader<'c> {
    runtime: &'c Runtime,
    reader: DataReader<'c>,
}

impl BlockingReader<'_> {
    /// Advance to the next row; `Ok(false)` at the end of the result.
    pub fn read(&mut self) -> DbResult<bool> {
        self.runtime.block_on(self.reader.read())
    }

    pub fn row(&self) -> DbResult<&DataRow> {
        self.reader.row()
    }

    /// Read a field of the current row, returning `default` for SQL NULL.
    pub fn read_field<T: DeserializeOwned>(&self, field_name: &str, default: T) -> DbResult<T> {
        self.reader.read_field(field_name, default)
    }

    pub fn rows_read(&self) -> u64 {
        self.reader.rows_read()
    }
}

impl Iterator for BlockingReader<'_> {
    type Item = DbResult<DataRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read() {
            Ok(true) => Some(self.reader.take_row()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
