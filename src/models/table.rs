//! In-memory result tables.
//!
//! `DataTable` is what execute-query-to-table returns; `DataRow` is also the
//! row type yielded by the engine-independent cursor. Cell values are kept as
//! JSON so both engines share one representation, and typed reads go through
//! serde.

use crate::error::{DbError, DbResult};
use crate::models::ColumnMetadata;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    columns: Arc<[String]>,
    values: Vec<JsonValue>,
}

impl DataRow {
    pub fn new(columns: Arc<[String]>, values: Vec<JsonValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[JsonValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column. Exact match first, then case-insensitive.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        find_column(self.columns.iter().map(String::as_str), name)
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.column_index(name).and_then(|idx| self.values.get(idx))
    }

    pub fn get_by_index(&self, index: usize) -> Option<&JsonValue> {
        self.values.get(index)
    }

    /// Read a field as `T`, returning `default` when the value is SQL NULL.
    ///
    /// Fails with `InvalidInput` for an empty field name, `ColumnNotFound` for an
    /// unknown column and `TypeMismatch` when the value does not convert.
    pub fn read_field<T: DeserializeOwned>(&self, field_name: &str, default: T) -> DbResult<T> {
        if field_name.is_empty() {
            return Err(DbError::invalid_input("Field name cannot be empty"));
        }

        let value = self
            .get(field_name)
            .ok_or_else(|| DbError::column_not_found(field_name))?;

        convert_value(value, field_name, default)
    }
}

/// Position of `name` among `columns`: exact match first, then
/// ASCII case-insensitive. Shared by every row type's `read_field`.
pub(crate) fn find_column<'a, I>(mut columns: I, name: &str) -> Option<usize>
where
    I: Iterator<Item = &'a str> + Clone,
{
    columns
        .clone()
        .position(|c| c == name)
        .or_else(|| columns.position(|c| c.eq_ignore_ascii_case(name)))
}

/// Convert a cell to `T`, mapping NULL to `default`.
pub(crate) fn convert_value<T: DeserializeOwned>(
    value: &JsonValue,
    field_name: &str,
    default: T,
) -> DbResult<T> {
    if value.is_null() {
        return Ok(default);
    }
    serde_json::from_value(value.clone()).map_err(|e| {
        DbError::type_mismatch(field_name, std::any::type_name::<T>(), e.to_string())
    })
}

impl Serialize for DataRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// A fully materialised query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataTable {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<DataRow>,
}

impl DataTable {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<DataRow>) -> Self {
        Self { columns, rows }
    }

    /// Get the number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DataRow> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a DataTable {
    type Item = &'a DataRow;
    type IntoIter = std::slice::Iter<'a, DataRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_row() -> DataRow {
        let columns: Arc<[String]> = vec![
            "intField".to_string(),
            "stringField".to_string(),
            "nullField".to_string(),
            "createdAt".to_string(),
        ]
        .into();
        DataRow::new(
            columns,
            vec![
                json!(5),
                json!("param2Value"),
                JsonValue::Null,
                json!("2024-03-01T12:30:00"),
            ],
        )
    }

    #[test]
    fn test_find_column_prefers_exact_match() {
        let names = ["Name", "name", "ID"];
        assert_eq!(find_column(names.iter().copied(), "name"), Some(1));
        assert_eq!(find_column(names.iter().copied(), "NAME"), Some(0));
        assert_eq!(find_column(names.iter().copied(), "id"), Some(2));
        assert_eq!(find_column(names.iter().copied(), "missing"), None);
    }

    #[test]
    fn test_read_field_typed() {
        let row = sample_row();
        assert_eq!(row.read_field::<i32>("intField", 0).unwrap(), 5);
        assert_eq!(
            row.read_field::<String>("stringField", String::new()).unwrap(),
            "param2Value"
        );
    }

    #[test]
    fn test_read_field_null_returns_default() {
        let row = sample_row();
        assert_eq!(row.read_field::<i64>("nullField", -1).unwrap(), -1);
        assert_eq!(row.read_field::<Option<String>>("nullField", None).unwrap(), None);
    }

    #[test]
    fn test_read_field_case_insensitive_fallback() {
        let row = sample_row();
        assert_eq!(row.read_field::<i32>("INTFIELD", 0).unwrap(), 5);
    }

    #[test]
    fn test_read_field_temporal_from_string() {
        let row = sample_row();
        let ts = row
            .read_field::<chrono::NaiveDateTime>("createdAt", Default::default())
            .unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 12:30:00");
    }

    #[test]
    fn test_read_field_errors() {
        let row = sample_row();
        assert!(matches!(
            row.read_field::<i32>("", 0),
            Err(DbError::InvalidInput { .. })
        ));
        assert!(matches!(
            row.read_field::<i32>("missing", 0),
            Err(DbError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            row.read_field::<i32>("stringField", 0),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_row_serializes_in_column_order() {
        let row = sample_row();
        let text = serde_json::to_string(&row).unwrap();
        assert!(text.starts_with(r#"{"intField":5,"stringField":"param2Value""#));
    }

    #[test]
    fn test_table_accessors() {
        let table = DataTable::new(
            vec![ColumnMetadata::new("intField", "INT", false)],
            vec![sample_row()],
        );
        assert_eq!(table.row_count(), 1);
        assert!(!table.is_empty());
        assert_eq!(table.column_names(), vec!["intField"]);
        assert_eq!((&table).into_iter().count(), 1);
        assert!(DataTable::default().is_empty());
    }
}
