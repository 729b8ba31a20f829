//! Query-related data models.
//!
//! This module defines parameter values, transaction batches and the
//! summaries returned by the execution helpers.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 3600;

/// A positional parameter value for parameterized queries.
///
/// Placeholders are engine-native: `?` for MySQL, `@P1`, `@P2`, ... for SQL Server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON, never produced by deserialization)
    #[serde(serialize_with = "base64_bytes::serialize", skip_deserializing)]
    Bytes(Vec<u8>),
    /// Structured JSON value, sent as JSON text
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    /// Parse a parameter given as command-line text.
    ///
    /// `null`, `true` and `false` (case-insensitive) map to their SQL values,
    /// integers and floats map to numbers, and anything else is a string.
    /// A leading `=` forces the rest to be taken as a string, so `=42` binds
    /// the text "42".
    pub fn parse_cli(text: &str) -> Self {
        if let Some(literal) = text.strip_prefix('=') {
            return Self::String(literal.to_string());
        }
        if text.eq_ignore_ascii_case("null") {
            return Self::Null;
        }
        if text.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if text.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(v) = text.parse::<i64>() {
            return Self::Int(v);
        }
        if let Ok(v) = text.parse::<f64>() {
            if v.is_finite() {
                return Self::Float(v);
            }
        }
        Self::String(text.to_string())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }
}

/// Reject empty SQL before anything is sent to the server.
pub fn validate_sql(sql: &str) -> DbResult<()> {
    if sql.trim().is_empty() {
        return Err(DbError::invalid_input("Query cannot be empty"));
    }
    Ok(())
}

/// A parameter bound by name, written `@name` in the SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParam {
    /// A leading `@` is ignored when binding
    pub name: String,
    pub value: QueryParam,
}

impl NamedParam {
    /// A leading `@` on `name` is optional.
    pub fn new(name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        let name: String = name.into();
        let name = name.strip_prefix('@').map(str::to_string).unwrap_or(name);
        Self {
            name,
            value: value.into(),
        }
    }

    /// Name as written after `@`, also for values deserialized with the `@`.
    pub fn key(&self) -> &str {
        self.name.strip_prefix('@').unwrap_or(&self.name)
    }
}

/// One statement of a transactional batch.
///
/// Parameters are either positional (`params`) or named (`named_params`),
/// never both in the same statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    pub query: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub named_params: Vec<NamedParam>,
}

impl TransactionData {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
            named_params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn with_params(mut self, params: Vec<QueryParam>) -> Self {
        self.params = params;
        self
    }

    /// Add a parameter referenced as `@name` in the query.
    pub fn with_named_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<QueryParam>,
    ) -> Self {
        self.named_params.push(NamedParam::new(name, value));
        self
    }
}

/// Outcome of a committed transactional batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub transaction_id: String,
    pub statements: usize,
    /// Sum of rows affected by every statement
    pub rows_affected: u64,
    pub elapsed_ms: u64,
}

/// Column description taken from the first row of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "BIGINT", "VARCHAR", "NVarchar")
    pub type_name: String,
    pub nullable: bool,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nullable,
        }
    }
}
