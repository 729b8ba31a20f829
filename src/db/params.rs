//! Parameter binding utilities for database queries.
//!
//! This module maps `QueryParam` values onto each driver's parameter API:
//! sqlx argument binding for MySQL and `tiberius::ToSql` for SQL Server.
//! It also rewrites `@name` parameters into each engine's positional form.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, NamedParam, QueryParam, TransactionData};
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::types::Json;
use std::borrow::Cow;
use tiberius::{ColumnData, ToSql};

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Build a MySQL query with all parameters bound in order.
pub(crate) fn build_mysql_query<'q>(
    sql: &'q str,
    params: &'q [QueryParam],
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    params
        .iter()
        .fold(sqlx::query(sql), |query, param| bind_mysql_param(query, param))
}

/// SQL Server parameter conversion.
///
/// NULL is sent as a typed NULL NVARCHAR, which SQL Server converts implicitly
/// to the target column type.
impl ToSql for QueryParam {
    fn to_sql(&self) -> ColumnData<'_> {
        match self {
            QueryParam::Null => ColumnData::String(None),
            QueryParam::Bool(v) => ColumnData::Bit(Some(*v)),
            QueryParam::Int(v) => ColumnData::I64(Some(*v)),
            QueryParam::Float(v) => ColumnData::F64(Some(*v)),
            QueryParam::String(v) => ColumnData::String(Some(Cow::Borrowed(v.as_str()))),
            QueryParam::Bytes(v) => ColumnData::Binary(Some(Cow::Borrowed(v.as_slice()))),
            QueryParam::Json(v) => ColumnData::String(Some(Cow::Owned(v.to_string()))),
        }
    }
}

/// Borrow parameters as the slice of trait objects tiberius expects.
pub(crate) fn mssql_params(params: &[QueryParam]) -> Vec<&dyn ToSql> {
    params.iter().map(|p| p as &dyn ToSql).collect()
}

/// Rewrite `@name` references in `sql` to positional placeholders.
///
/// MySQL gets one `?` per occurrence, so a name used twice is bound twice.
/// SQL Server reuses `@Pn` for every occurrence of the same name. Names are
/// matched case-insensitively. String literals, quoted identifiers, comments
/// and `@@` system variables are left untouched, as is any `@x` that is not
/// one of `params`.
pub fn bind_named(
    db_type: DatabaseType,
    sql: &str,
    params: &[NamedParam],
) -> DbResult<(String, Vec<QueryParam>)> {
    validate_names(params)?;

    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    // index into `params` -> placeholder number, for SQL Server reuse
    let mut assigned: Vec<Option<usize>> = vec![None; params.len()];
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => i = skip_quoted(bytes, i, b'\'', db_type == DatabaseType::MySQL),
            b'"' => i = skip_quoted(bytes, i, b'"', db_type == DatabaseType::MySQL),
            b'`' if db_type == DatabaseType::MySQL => i = skip_quoted(bytes, i, b'`', false),
            b'[' if db_type == DatabaseType::MsSql => i = skip_quoted(bytes, i, b']', false),
            b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line(bytes, i),
            b'#' if db_type == DatabaseType::MySQL => i = skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = match sql[i + 2..].find("*/") {
                    Some(end) => i + 2 + end + 2,
                    None => bytes.len(),
                };
            }
            b'@' if bytes.get(i + 1) == Some(&b'@') => {
                i += 2;
                while i < bytes.len() && is_name_byte(bytes[i]) {
                    i += 1;
                }
            }
            b'@' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_name_byte(bytes[end]) {
                    end += 1;
                }
                let name = &sql[start..end];
                let found = params
                    .iter()
                    .position(|p| !name.is_empty() && p.key().eq_ignore_ascii_case(name));
                if let Some(idx) = found {
                    out.push_str(&sql[copied..i]);
                    let n = match (db_type, assigned[idx]) {
                        (DatabaseType::MsSql, Some(n)) => n,
                        _ => {
                            values.push(params[idx].value.clone());
                            assigned[idx] = Some(values.len());
                            values.len()
                        }
                    };
                    out.push_str(&db_type.placeholder(n));
                    copied = end;
                }
                i = end.max(i + 1);
            }
            _ => i += 1,
        }
    }
    out.push_str(&sql[copied..]);

    Ok((out, values))
}

/// Resolve a batch statement to positional form.
///
/// Statements without named parameters are returned as they are. Mixing
/// positional and named parameters in one statement is rejected.
pub fn resolve_statement(
    db_type: DatabaseType,
    statement: &TransactionData,
) -> DbResult<TransactionData> {
    if statement.named_params.is_empty() {
        return Ok(statement.clone());
    }
    if !statement.params.is_empty() {
        return Err(DbError::invalid_input(
            "A statement cannot mix positional and named parameters",
        ));
    }
    let (query, params) = bind_named(db_type, &statement.query, &statement.named_params)?;
    Ok(TransactionData::new(query).with_params(params))
}

fn validate_names(params: &[NamedParam]) -> DbResult<()> {
    for (i, param) in params.iter().enumerate() {
        let key = param.key();
        if key.is_empty() || !key.bytes().all(is_name_byte) {
            return Err(DbError::invalid_input(format!(
                "Invalid parameter name '{}'",
                param.name
            )));
        }
        if params[..i]
            .iter()
            .any(|p| p.key().eq_ignore_ascii_case(key))
        {
            return Err(DbError::invalid_input(format!(
                "Parameter '{}' is given more than once",
                param.name
            )));
        }
    }
    Ok(())
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Index just past the literal opened at `start`. A doubled closing quote
/// stays inside the literal.
fn skip_quoted(bytes: &[u8], start: usize, close: u8, backslash_escapes: bool) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if backslash_escapes && bytes[i] == b'\\' {
            i += 2;
            continue;
        }
        if bytes[i] == close {
            if bytes.get(i + 1) == Some(&close) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn named(pairs: &[(&str, QueryParam)]) -> Vec<NamedParam> {
        pairs
            .iter()
            .map(|(name, value)| NamedParam::new(*name, value.clone()))
            .collect()
    }

    #[test]
    fn test_bind_named_mysql_follows_occurrence_order() {
        let params = named(&[("b", QueryParam::Int(2)), ("a", QueryParam::Int(1))]);
        let (sql, values) = bind_named(
            DatabaseType::MySQL,
            "SELECT * FROM t WHERE a = @a AND b = @b OR a2 = @A",
            &params,
        )
        .unwrap();

        assert_eq!(sql, "SELECT * FROM t WHERE a = ? AND b = ? OR a2 = ?");
        assert_eq!(
            values,
            vec![QueryParam::Int(1), QueryParam::Int(2), QueryParam::Int(1)]
        );
    }

    #[test]
    fn test_bind_named_mssql_reuses_numbers() {
        let params = named(&[("id", QueryParam::Int(7)), ("name", "x".into())]);
        let (sql, values) = bind_named(
            DatabaseType::MsSql,
            "UPDATE t SET name = @name WHERE id = @id OR parent = @id",
            &params,
        )
        .unwrap();

        assert_eq!(sql, "UPDATE t SET name = @P1 WHERE id = @P2 OR parent = @P2");
        assert_eq!(values, vec![QueryParam::from("x"), QueryParam::Int(7)]);
    }

    #[test]
    fn test_bind_named_skips_literals_and_comments() {
        let params = named(&[("id", QueryParam::Int(1))]);

        let (sql, values) = bind_named(
            DatabaseType::MySQL,
            "SELECT '@id', 'it''s @id', `@id` -- @id\n# @id\nFROM t /* @id */ WHERE id = @id",
            &params,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT '@id', 'it''s @id', `@id` -- @id\n# @id\nFROM t /* @id */ WHERE id = ?"
        );
        assert_eq!(values.len(), 1);

        let (sql, _) = bind_named(
            DatabaseType::MsSql,
            "SELECT [@id], N'@id', @@TRANCOUNT FROM t WHERE id = @id",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "SELECT [@id], N'@id', @@TRANCOUNT FROM t WHERE id = @P1");
    }

    #[test]
    fn test_bind_named_mysql_backslash_escape() {
        let params = named(&[("v", QueryParam::Int(1))]);
        let (sql, _) = bind_named(DatabaseType::MySQL, r"SELECT 'a\' @v', @v", &params).unwrap();
        assert_eq!(sql, r"SELECT 'a\' @v', ?");
    }

    #[test]
    fn test_bind_named_leaves_unknown_names() {
        let params = named(&[("id", QueryParam::Int(1))]);
        let (sql, values) = bind_named(
            DatabaseType::MySQL,
            "SET @counter = @id; SELECT @identity, @",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "SET @counter = ?; SELECT @identity, @");
        assert_eq!(values, vec![QueryParam::Int(1)]);
    }

    #[test]
    fn test_bind_named_rejects_bad_names() {
        let dup = named(&[("id", QueryParam::Int(1)), ("ID", QueryParam::Int(2))]);
        assert!(matches!(
            bind_named(DatabaseType::MySQL, "SELECT @id", &dup),
            Err(DbError::InvalidInput { .. })
        ));

        let invalid = named(&[("bad name", QueryParam::Null)]);
        assert!(matches!(
            bind_named(DatabaseType::MsSql, "SELECT 1", &invalid),
            Err(DbError::InvalidInput { .. })
        ));

        let empty = named(&[("@", QueryParam::Null)]);
        assert!(matches!(
            bind_named(DatabaseType::MsSql, "SELECT 1", &empty),
            Err(DbError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_resolve_statement() {
        let plain = TransactionData::new("DELETE FROM t").with_param(1);
        assert_eq!(resolve_statement(DatabaseType::MySQL, &plain).unwrap(), plain);

        let stmt = TransactionData::new("INSERT INTO t (a) VALUES (@a)").with_named_param("@a", 5);
        let resolved = resolve_statement(DatabaseType::MsSql, &stmt).unwrap();
        assert_eq!(resolved.query, "INSERT INTO t (a) VALUES (@P1)");
        assert_eq!(resolved.params, vec![QueryParam::Int(5)]);
        assert!(resolved.named_params.is_empty());

        let mixed = stmt.with_param(1);
        assert!(matches!(
            resolve_statement(DatabaseType::MySQL, &mixed),
            Err(DbError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_mssql_scalar_params() {
        assert!(matches!(QueryParam::Null.to_sql(), ColumnData::String(None)));
        assert!(matches!(QueryParam::Bool(true).to_sql(), ColumnData::Bit(Some(true))));
        assert!(matches!(QueryParam::Int(5).to_sql(), ColumnData::I64(Some(5))));
        assert!(matches!(
            QueryParam::Float(1.5).to_sql(),
            ColumnData::F64(Some(v)) if v == 1.5
        ));
    }

    #[test]
    fn test_mssql_text_and_binary_params() {
        match QueryParam::String("param2Value".into()).to_sql() {
            ColumnData::String(Some(s)) => assert_eq!(s, "param2Value"),
            other => panic!("unexpected column data: {:?}", other),
        }
        match QueryParam::Bytes(vec![0xde, 0xad]).to_sql() {
            ColumnData::Binary(Some(b)) => assert_eq!(&*b, &[0xde_u8, 0xad][..]),
            other => panic!("unexpected column data: {:?}", other),
        }
        match QueryParam::Json(json!({"a": 1})).to_sql() {
            ColumnData::String(Some(s)) => assert_eq!(s, r#"{"a":1}"#),
            other => panic!("unexpected column data: {:?}", other),
        }
    }

    #[test]
    fn test_mssql_params_keeps_order() {
        let params = vec![QueryParam::Int(1), QueryParam::Int(2)];
        let refs = mssql_params(&params);
        assert_eq!(refs.len(), 2);
        assert!(matches!(refs[1].to_sql(), ColumnData::I64(Some(2))));
    }
}
