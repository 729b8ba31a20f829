//! Transactional batches.
//!
//! A batch is an ordered list of statements executed inside one transaction.
//! Statements run strictly one after another on the transaction's
//! connection. The first failure rolls the transaction back and is returned
//! to the caller unchanged; if the rollback itself fails, that failure is
//! logged and dropped. A failed commit is reported as a transaction error
//! carrying the transaction id.

use crate::db::guard::ExecutionGuard;
use crate::db::params::resolve_statement;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam, TransactionData, TransactionSummary};
use async_trait::async_trait;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info, warn};

/// An open transaction on a single connection.
#[async_trait]
pub trait TransactionScope: Send + Sized {
    /// Execute one statement, returning the rows it affected.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    async fn commit(self) -> DbResult<()>;

    async fn rollback(self) -> DbResult<()>;
}

/// Generate a unique transaction ID.
pub fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

/// Reject a batch containing a statement with empty SQL.
pub fn validate_batch(batch: &[TransactionData]) -> DbResult<()> {
    for (idx, statement) in batch.iter().enumerate() {
        if statement.query.trim().is_empty() {
            return Err(DbError::invalid_input(format!(
                "Statement {} of the transaction is empty",
                idx + 1
            )));
        }
    }
    Ok(())
}

/// Validate `batch`, open a transaction with `begin` and run the batch in it.
///
/// Named parameters are rewritten for `db_type` before anything is sent.
/// An empty batch opens nothing and reports zero statements. `BEGIN` runs
/// outside the guard; cancellation is only checked before it is sent.
pub async fn execute_batch<S, B, Fut>(
    db_type: DatabaseType,
    batch: &[TransactionData],
    guard: &ExecutionGuard,
    begin: B,
) -> DbResult<TransactionSummary>
where
    S: TransactionScope,
    B: FnOnce() -> Fut,
    Fut: Future<Output = DbResult<S>>,
{
    validate_batch(batch)?;
    let batch = batch
        .iter()
        .map(|statement| resolve_statement(db_type, statement))
        .collect::<DbResult<Vec<_>>>()?;

    let transaction_id = generate_transaction_id();
    if batch.is_empty() {
        debug!(transaction_id = %transaction_id, "Empty batch, no transaction opened");
        return Ok(TransactionSummary {
            transaction_id,
            statements: 0,
            rows_affected: 0,
            elapsed_ms: 0,
        });
    }

    if guard.is_cancelled() {
        return Err(DbError::cancelled("begin transaction"));
    }

    let start = Instant::now();
    let scope = begin().await?;
    info!(
        transaction_id = %transaction_id,
        statements = batch.len(),
        "Transaction started ({})",
        db_type.display_name()
    );

    let rows_affected = run_batch(scope, &transaction_id, &batch, guard).await?;
    let elapsed_ms = start.elapsed().as_millis() as u64;

    info!(
        transaction_id = %transaction_id,
        rows_affected = rows_affected,
        elapsed_ms = elapsed_ms,
        "Transaction committed"
    );

    Ok(TransactionSummary {
        transaction_id,
        statements: batch.len(),
        rows_affected,
        elapsed_ms,
    })
}

/// Run every statement of `batch` in `scope`, then commit.
///
/// The guard applies to each statement separately so a timeout or
/// cancellation still leaves room for the rollback. Commit and rollback are
/// never cut short by the guard.
pub async fn run_batch<S: TransactionScope>(
    mut scope: S,
    transaction_id: &str,
    batch: &[TransactionData],
    guard: &ExecutionGuard,
) -> DbResult<u64> {
    let mut total = 0u64;

    for (idx, statement) in batch.iter().enumerate() {
        debug!(
            transaction_id = %transaction_id,
            statement = idx + 1,
            sql = %statement.query,
            params = statement.params.len(),
            "Executing transaction statement"
        );

        let result = guard
            .run(
                "transaction statement",
                scope.execute(&statement.query, &statement.params),
            )
            .await;

        match result {
            Ok(rows) => total += rows,
            Err(err) => {
                warn!(
                    transaction_id = %transaction_id,
                    statement = idx + 1,
                    error = %err,
                    "Statement failed, rolling back"
                );
                if let Err(rollback_err) = scope.rollback().await {
                    warn!(
                        transaction_id = %transaction_id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                return Err(err);
            }
        }
    }

    scope.commit().await.map_err(|err| {
        warn!(transaction_id = %transaction_id, error = %err, "Commit failed");
        DbError::transaction(format!("Commit failed: {}", err), transaction_id)
    })?;
    Ok(total)
}
