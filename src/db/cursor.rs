//! Forward-only cursors over query results.
//!
//! A `Cursor` borrows its connection for as long as it lives, so no other
//! statement can run on that connection until the cursor is dropped. Rows
//! are pulled one at a time with `read()`, and `row()` exposes the row the
//! cursor is positioned on.

use crate::db::guard::ExecutionGuard;
use crate::db::types::RowToValues;
use crate::error::{DbError, DbResult};
use crate::models::DataRow;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub struct Cursor<'c, R> {
    stream: BoxStream<'c, DbResult<R>>,
    current: Option<R>,
    rows_read: u64,
    finished: bool,
    guard: ExecutionGuard,
}

/// Engine-independent cursor.
pub type DataReader<'c> = Cursor<'c, DataRow>;

impl<'c, R: Send + 'c> Cursor<'c, R> {
    pub fn new(stream: BoxStream<'c, DbResult<R>>) -> Self {
        Self {
            stream,
            current: None,
            rows_read: 0,
            finished: false,
            guard: ExecutionGuard::none(),
        }
    }

    /// Apply `guard` to every subsequent `read()`.
    pub fn with_guard(mut self, guard: ExecutionGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Advance to the next row.
    ///
    /// Returns `Ok(false)` once the result is exhausted; further calls keep
    /// returning `Ok(false)`. An error also ends the cursor.
    pub async fn read(&mut self) -> DbResult<bool> {
        self.current = None;
        if self.finished {
            return Ok(false);
        }

        let stream = &mut self.stream;
        let next = self
            .guard
            .run("cursor read", async move { Ok(stream.next().await) })
            .await;

        match next {
            Ok(Some(Ok(row))) => {
                self.current = Some(row);
                self.rows_read += 1;
                Ok(true)
            }
            Ok(None) => {
                self.finished = true;
                Ok(false)
            }
            Ok(Some(Err(err))) | Err(err) => {
                self.finished = true;
                Err(err)
            }
        }
    }

    /// The row the cursor is positioned on.
    pub fn row(&self) -> DbResult<&R> {
        self.current.as_ref().ok_or(DbError::NoCurrentRow)
    }

    /// Take ownership of the current row, leaving the cursor without one.
    pub fn take_row(&mut self) -> DbResult<R> {
        self.current.take().ok_or(DbError::NoCurrentRow)
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Convert rows lazily as they are read.
    pub fn map_rows<U, F>(self, f: F) -> Cursor<'c, U>
    where
        U: Send + 'c,
        F: FnMut(R) -> U + Send + 'c,
    {
        let mut f = f;
        let current = self.current.map(&mut f);
        Cursor {
            stream: self.stream.map(move |item| item.map(&mut f)).boxed(),
            current,
            rows_read: self.rows_read,
            finished: self.finished,
            guard: self.guard,
        }
    }
}

impl<'c, R: RowToValues + Send + 'c> Cursor<'c, R> {
    /// Turn a driver cursor into an engine-independent `DataReader`.
    ///
    /// Column names are built from the first row and shared by the rows
    /// that follow, until a row arrives with a different shape.
    pub fn into_data_reader(self) -> DataReader<'c> {
        let mut columns: Option<Arc<[String]>> = None;
        self.map_rows(move |row: R| {
            let names = match columns.take() {
                Some(names) if row.has_columns(&names) => names,
                _ => row.column_names(),
            };
            let data_row = row.to_data_row_with(&names);
            columns = Some(names);
            data_row
        })
    }
}

impl DataReader<'_> {
    /// Read a field of the current row, returning `default` for SQL NULL.
    pub fn read_field<T: DeserializeOwned>(&self, field_name: &str, default: T) -> DbResult<T> {
        self.row()?.read_field(field_name, default)
    }
}
