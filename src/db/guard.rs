//! Timeout and cancellation for driver calls.
//!
//! Every helper runs its driver future through an `ExecutionGuard`. The
//! guard races the future against an optional deadline and an optional
//! `CancellationToken`; whichever finishes first decides the outcome.

use crate::error::{DbError, DbResult};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct ExecutionGuard {
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl ExecutionGuard {
    /// A guard that never times out and cannot be cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// Drive `fut` to completion under this guard.
    ///
    /// A token that is already cancelled fails before `fut` is polled.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        if self.is_cancelled() {
            return Err(DbError::cancelled(operation));
        }

        let timed = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(DbError::timeout(operation, limit)),
                },
                None => fut.await,
            }
        };

        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(DbError::cancelled(operation)),
                    result = timed => result,
                }
            }
            None => timed.await,
        }
    }
}
