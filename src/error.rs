//! Error types for sql-ext.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Driver errors from both engines are folded into one `DbError` so callers can
//! match on the failure kind without caring which database produced it.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLSTATE for MySQL, error number for SQL Server
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Timeout: {operation} exceeded {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("Cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Cannot read column '{column}' as {expected}: {message}")]
    TypeMismatch {
        column: String,
        expected: String,
        message: String,
    },

    #[error("No current row: call read() and check that it returned true")]
    NoCurrentRow,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit,
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    pub fn column_not_found(column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            column: column.into(),
        }
    }

    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", Duration::from_secs(30)),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DbError::column_not_found(col),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => {
                DbError::column_not_found(format!("#{} (row has {} columns)", index, len))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::type_mismatch(index, "requested type", source.to_string())
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert tiberius (SQL Server) errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;

        match err {
            TdsError::Server(token) => DbError::database(
                token.message(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(msg) => DbError::connection(
                format!("TLS error: {}", msg),
                "Verify TLS configuration or add trust_cert=true for self-signed servers",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested redirect to {}:{}", host, port),
                "Connect to the redirected host directly",
            ),
            TdsError::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            TdsError::Conversion(msg) => {
                DbError::type_mismatch("?", "requested type", msg.to_string())
            }
            other => DbError::internal(format!("SQL Server driver error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42000".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(DbError::NoCurrentRow.suggestion(), None);
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", Duration::from_secs(30)).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::cancelled("query").is_retryable());
        assert!(!DbError::invalid_input("empty").is_retryable());
    }

    #[test]
    fn test_column_errors_name_the_column() {
        let err = DbError::column_not_found("intField");
        assert!(err.to_string().contains("intField"));

        let err = DbError::type_mismatch("stringField", "i64", "invalid type: string");
        let text = err.to_string();
        assert!(text.contains("stringField"));
        assert!(text.contains("i64"));
    }

    #[test]
    fn test_sqlx_column_not_found_maps() {
        let err: DbError = sqlx::Error::ColumnNotFound("missing".to_string()).into();
        assert!(matches!(err, DbError::ColumnNotFound { ref column } if column == "missing"));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_database() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::Database { .. }));
    }

    #[test]
    fn test_tiberius_routing_maps_to_connection() {
        let err: DbError = tiberius::error::Error::Routing {
            host: "replica".to_string(),
            port: 1433,
        }
        .into();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.to_string().contains("replica:1433"));
    }
}
