//! Database-agnostic type mappings.
//!
//! This module converts driver rows into `DataRow`s so that tables and the
//! engine-independent cursor look the same for MySQL and SQL Server.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::db::DatabaseType;
use crate::models::{ColumnMetadata, DataRow};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Temporal,
    Uuid,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric/Money - check first as "smallmoney" would otherwise look like text
    if lower.contains("decimal") || lower.contains("numeric") || lower.contains("money") {
        return TypeCategory::Decimal;
    }

    // MySQL reports BOOLEAN columns as TINYINT(1); sqlx names them "BOOLEAN"
    if lower == "bool" || lower == "boolean" || lower == "bit" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower == "year" {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    if lower == "json" {
        return TypeCategory::Json;
    }

    if lower == "guid" || lower == "uniqueidentifier" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob")
        || lower.contains("binary")
        || lower == "image"
        || lower == "bigvarbin"
        || lower == "bigbinary"
    {
        return TypeCategory::Binary;
    }

    if lower.contains("date") || lower.contains("time") {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower.contains("text") || lower == "enum" || lower == "set" {
        return TypeCategory::Text;
    }

    if db == DatabaseType::MsSql && lower == "xml" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Encode binary data as a base64 JSON string.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    JsonValue::String(STANDARD.encode(bytes))
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

// =============================================================================
// Row Conversion Trait
// =============================================================================

/// Trait for converting driver rows into `DataRow`s.
pub trait RowToValues {
    fn column_names(&self) -> Arc<[String]>;
    fn to_values(&self) -> Vec<JsonValue>;
    fn get_column_metadata(&self) -> Vec<ColumnMetadata>;

    fn to_data_row(&self) -> DataRow {
        DataRow::new(self.column_names(), self.to_values())
    }

    /// Like `to_data_row`, reusing column names already built for this result.
    fn to_data_row_with(&self, columns: &Arc<[String]>) -> DataRow {
        DataRow::new(Arc::clone(columns), self.to_values())
    }

    /// Whether this row's columns are exactly `names`, in order.
    fn has_columns(&self, names: &[String]) -> bool {
        *self.column_names() == *names
    }
}

impl RowToValues for MySqlRow {
    fn column_names(&self) -> Arc<[String]> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn has_columns(&self, names: &[String]) -> bool {
        self.columns().len() == names.len()
            && self.columns().iter().zip(names).all(|(c, n)| c.name() == n)
    }

    fn to_values(&self) -> Vec<JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, category)
            })
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        self.columns()
            .iter()
            .map(|col| {
                ColumnMetadata::new(
                    col.name(),
                    col.type_info().name(),
                    !col.type_info().is_null(),
                )
            })
            .collect()
    }
}

impl RowToValues for tiberius::Row {
    fn column_names(&self) -> Arc<[String]> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn has_columns(&self, names: &[String]) -> bool {
        self.columns().len() == names.len()
            && self.columns().iter().zip(names).all(|(c, n)| c.name() == n)
    }

    fn to_values(&self) -> Vec<JsonValue> {
        self.cells()
            .enumerate()
            .map(|(idx, (_, data))| mssql::decode_cell(self, idx, data))
            .collect()
    }

    fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
        // TDS row metadata does not carry nullability
        self.columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), format!("{:?}", col.column_type()), true))
            .collect()
    }
}

/// Convert a batch of rows into a `DataTable`, sharing one column-name list.
///
/// The table holds the first result only: rows after the first change of
/// column shape are dropped.
pub fn rows_to_table<R: RowToValues>(rows: &[R]) -> crate::models::DataTable {
    let Some(first) = rows.first() else {
        return crate::models::DataTable::default();
    };
    let names = first.column_names();
    let table_rows: Vec<DataRow> = rows
        .iter()
        .take_while(|r| r.has_columns(&names))
        .map(|r| r.to_data_row_with(&names))
        .collect();
    if table_rows.len() < rows.len() {
        tracing::debug!(
            kept = table_rows.len(),
            dropped = rows.len() - table_rows.len(),
            "Ignoring rows of later result sets"
        );
    }
    crate::models::DataTable::new(first.get_column_metadata(), table_rows)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary_col(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> JsonValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => JsonValue::String(v.0),
            Ok(None) => JsonValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                JsonValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> JsonValue {
        // Check NULL first
        if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        // Unsigned columns
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return JsonValue::Number(v.into());
        }
        JsonValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(JsonValue::Bool)
            .unwrap_or(JsonValue::Null)
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return float_value(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return float_value(v as f64);
        }
        JsonValue::Null
    }

    fn decode_binary_col(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| encode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> JsonValue {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(JsonValue::Null)
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> JsonValue {
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

        if let Ok(None) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::Null;
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return JsonValue::String(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return JsonValue::String(v.to_string());
        }
        decode_text(row, idx)
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> JsonValue {
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return JsonValue::String(v);
        }
        // Text columns with a binary collation come back as bytes
        if let Ok(Some(v)) = row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
            return match String::from_utf8(v) {
                Ok(s) => JsonValue::String(s),
                Err(e) => encode_binary_value(e.as_bytes()),
            };
        }
        JsonValue::Null
    }
}

mod mssql {
    use super::*;
    use tiberius::ColumnData;

    pub fn decode_cell(row: &tiberius::Row, idx: usize, data: &ColumnData<'static>) -> JsonValue {
        match data {
            ColumnData::U8(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
            ColumnData::I16(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
            ColumnData::I32(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
            ColumnData::I64(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
            ColumnData::F32(v) => v.map(|f| float_value(f as f64)).unwrap_or(JsonValue::Null),
            ColumnData::F64(v) => v.map(float_value).unwrap_or(JsonValue::Null),
            ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
            ColumnData::String(v) => v
                .as_deref()
                .map(|s| JsonValue::String(s.to_string()))
                .unwrap_or(JsonValue::Null),
            ColumnData::Guid(v) => v
                .as_ref()
                .map(|g| JsonValue::String(g.to_string()))
                .unwrap_or(JsonValue::Null),
            ColumnData::Binary(v) => v
                .as_deref()
                .map(encode_binary_value)
                .unwrap_or(JsonValue::Null),
            ColumnData::Numeric(v) => v
                .as_ref()
                .map(|n| JsonValue::String(n.to_string()))
                .unwrap_or(JsonValue::Null),
            ColumnData::Xml(v) => v
                .as_deref()
                .map(|x| JsonValue::String(x.clone().into_string()))
                .unwrap_or(JsonValue::Null),
            _ => decode_temporal(row, idx),
        }
    }

    /// Date/time and XML cells: let the driver's chrono conversions do the work.
    fn decode_temporal(row: &tiberius::Row, idx: usize) -> JsonValue {
        use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};

        if let Ok(v) = row.try_get::<NaiveDateTime, _>(idx) {
            return v
                .map(|v| JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
                .unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<DateTime<FixedOffset>, _>(idx) {
            return v
                .map(|v| JsonValue::String(v.to_rfc3339()))
                .unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<NaiveDate, _>(idx) {
            return v
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or(JsonValue::Null);
        }
        if let Ok(v) = row.try_get::<NaiveTime, _>(idx) {
            return v
                .map(|v| JsonValue::String(v.to_string()))
                .unwrap_or(JsonValue::Null);
        }
        tracing::debug!(column = idx, "Unsupported SQL Server cell type, returning NULL");
        JsonValue::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// In-memory row with fixed column names.
    struct PlainRow {
        names: &'static [&'static str],
        values: Vec<i64>,
    }

    impl RowToValues for PlainRow {
        fn column_names(&self) -> Arc<[String]> {
            self.names.iter().map(|n| n.to_string()).collect()
        }

        fn to_values(&self) -> Vec<JsonValue> {
            self.values.iter().map(|v| json!(v)).collect()
        }

        fn get_column_metadata(&self) -> Vec<ColumnMetadata> {
            self.names
                .iter()
                .map(|n| ColumnMetadata::new(*n, "BIGINT", false))
                .collect()
        }
    }

    #[test]
    fn test_rows_to_table_keeps_first_result_only() {
        let rows = vec![
            PlainRow { names: &["a"], values: vec![1] },
            PlainRow { names: &["a"], values: vec![2] },
            PlainRow { names: &["b", "c"], values: vec![3, 4] },
            PlainRow { names: &["a"], values: vec![5] },
        ];

        let table = rows_to_table(&rows);

        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].get("a"), Some(&json!(2)));
    }

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("Intn", DatabaseType::MsSql),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("DECIMAL", DatabaseType::MySQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("Money", DatabaseType::MsSql),
            TypeCategory::Decimal
        );
    }

    #[test]
    fn test_categorize_type_boolean_and_temporal() {
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("Bit", DatabaseType::MsSql),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("TIMESTAMP", DatabaseType::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("Datetime2", DatabaseType::MsSql),
            TypeCategory::Temporal
        );
    }

    #[test]
    fn test_categorize_type_text_binary_json() {
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("NVarchar", DatabaseType::MsSql),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("VARBINARY", DatabaseType::MySQL),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("JSON", DatabaseType::MySQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("Guid", DatabaseType::MsSql),
            TypeCategory::Uuid
        );
        assert_eq!(
            categorize_type("Xml", DatabaseType::MsSql),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_encode_binary_value() {
        assert_eq!(
            encode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            encode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
        assert_eq!(encode_binary_value(&[]), JsonValue::String(String::new()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }

    #[test]
    fn test_rows_to_table_empty() {
        let rows: Vec<MySqlRow> = Vec::new();
        let table = rows_to_table(&rows);
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
