//! In-memory provider shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::{Value as JsonValue, json};
use sql_ext::db::transaction::{TransactionScope, execute_batch};
use sql_ext::db::{Cursor, DataReader, ExecutionGuard, SqlProvider};
use sql_ext::error::{DbError, DbResult};
use sql_ext::models::{
    ColumnMetadata, DataRow, DataTable, DatabaseType, QueryParam, TransactionData,
    TransactionSummary,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Log = Arc<Mutex<Vec<String>>>;

/// Serves a fixed result set and records every statement it receives.
///
/// Any statement containing `FAIL` returns a database error; any statement
/// containing `SLOW` sleeps for a minute first.
pub struct FakeProvider {
    pub log: Log,
    columns: Arc<[String]>,
    rows: Vec<Vec<JsonValue>>,
    closed: Arc<Mutex<bool>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::with_rows(
            &["id", "name", "score"],
            vec![
                vec![json!(1), json!("Alice"), json!(9.5)],
                vec![json!(2), json!("Bob"), JsonValue::Null],
            ],
        )
    }

    pub fn with_rows(columns: &[&str], rows: Vec<Vec<JsonValue>>) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            columns: columns.iter().map(|c| c.to_string()).collect::<Vec<_>>().into(),
            rows,
            closed: Arc::new(Mutex::new(false)),
        }
    }

    pub fn empty() -> Self {
        Self::with_rows(&["value"], Vec::new())
    }

    pub fn closed_flag(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.closed)
    }

    pub fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    fn data_rows(&self) -> Vec<DataRow> {
        self.rows
            .iter()
            .map(|values| DataRow::new(Arc::clone(&self.columns), values.clone()))
            .collect()
    }
}

async fn run_statement(log: &Log, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
    log.lock().unwrap().push(sql.to_string());
    if sql.contains("SLOW") {
        tokio::time::sleep(Duration::from_secs(60)).await;
    }
    if sql.contains("FAIL") {
        return Err(DbError::database(
            format!("statement failed: {}", sql),
            Some("42000".to_string()),
            "Check the statement",
        ));
    }
    Ok(params.len().max(1) as u64)
}

pub struct FakeScope {
    log: Log,
}

#[async_trait]
impl TransactionScope for FakeScope {
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        run_statement(&self.log, sql, params).await
    }

    async fn commit(self) -> DbResult<()> {
        self.log.lock().unwrap().push("COMMIT".to_string());
        Ok(())
    }

    async fn rollback(self) -> DbResult<()> {
        self.log.lock().unwrap().push("ROLLBACK".to_string());
        Ok(())
    }
}

#[async_trait]
impl SqlProvider for FakeProvider {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn execute_non_query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        run_statement(&self.log, sql, params).await
    }

    async fn execute_transaction(
        &mut self,
        batch: &[TransactionData],
        guard: &ExecutionGuard,
    ) -> DbResult<TransactionSummary> {
        let log = Arc::clone(&self.log);
        execute_batch(DatabaseType::MySQL, batch, guard, move || async move {
            log.lock().unwrap().push("BEGIN".to_string());
            Ok(FakeScope { log })
        })
        .await
    }

    async fn execute_query_table(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<DataTable> {
        run_statement(&self.log, sql, params).await?;
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnMetadata::new(c.as_str(), "TEXT", true))
            .collect();
        Ok(DataTable::new(columns, self.data_rows()))
    }

    async fn execute_query_reader<'c>(
        &'c mut self,
        sql: &'c str,
        params: &'c [QueryParam],
    ) -> DbResult<DataReader<'c>> {
        run_statement(&self.log, sql, params).await?;
        let rows = self.data_rows();
        Ok(Cursor::new(
            futures_util::stream::iter(rows.into_iter().map(Ok)).boxed(),
        ))
    }

    async fn execute_scalar_value(
        &mut self,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<JsonValue> {
        run_statement(&self.log, sql, params).await?;
        Ok(self
            .rows
            .first()
            .and_then(|row| row.first().cloned())
            .unwrap_or(JsonValue::Null))
    }

    async fn close(self) -> DbResult<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}
