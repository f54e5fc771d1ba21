//! Bidirectional marshaling between the engine's storage classes and the
//! logical value model.
//!
//! Encoding is schema-independent: every [`DbValue`] has exactly one storage
//! form. Decoding is schema-aware: the raw storage value of a column known to
//! the schema is lifted back to its logical kind; unknown columns (raw
//! queries) pass through unchanged.

use std::sync::Arc;

use rusqlite::ToSql;
use rusqlite::types::{Value, ValueRef};

use crate::error::DbError;
use crate::results::{ResultSet, Row};
use crate::schema::column::ColumnKind;
use crate::schema::table::TableSchema;
use crate::types::DbValue;

/// Encode a logical value into its storage parameter.
///
/// Booleans become `0`/`1`, timestamps their millisecond epoch, JSON its
/// serialized text.
#[must_use]
pub fn encode_value(value: &DbValue) -> Value {
    match value {
        DbValue::Int(i) => Value::Integer(*i),
        DbValue::Float(f) => Value::Real(*f),
        DbValue::Text(s) => Value::Text(s.clone()),
        DbValue::Bool(b) => Value::Integer(i64::from(*b)),
        DbValue::Timestamp(dt) => Value::Integer(dt.and_utc().timestamp_millis()),
        DbValue::Json(json) => Value::Text(json.to_string()),
        DbValue::Null => Value::Null,
        DbValue::Blob(bytes) => Value::Blob(bytes.clone()),
    }
}

/// Encode a parameter vector.
#[must_use]
pub fn encode_params(params: &[DbValue]) -> Vec<Value> {
    params.iter().map(encode_value).collect()
}

/// Extract a raw storage value from an engine row.
///
/// # Errors
///
/// Propagates engine errors from the column read.
pub fn value_from_engine(row: &rusqlite::Row, idx: usize) -> Result<DbValue, DbError> {
    match row.get_ref(idx)? {
        ValueRef::Null => Ok(DbValue::Null),
        ValueRef::Integer(i) => Ok(DbValue::Int(i)),
        ValueRef::Real(f) => Ok(DbValue::Float(f)),
        ValueRef::Text(bytes) => Ok(DbValue::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(bytes) => Ok(DbValue::Blob(bytes.to_vec())),
    }
}

/// Run a prepared statement and materialize every row into a [`ResultSet`]
/// of raw storage values.
///
/// # Errors
///
/// Propagates engine errors from execution or row extraction.
pub fn build_result_set(
    stmt: &mut rusqlite::Statement,
    params: &[Value],
) -> Result<ResultSet, DbError> {
    let param_refs: Vec<&dyn ToSql> = params.iter().map(|v| v as &dyn ToSql).collect();
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(16);
    result_set.set_column_names(Arc::new(column_names));

    let mut rows = stmt.query(&param_refs[..])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(value_from_engine(row, idx)?);
        }
        result_set.add_row_values(values);
    }
    Ok(result_set)
}

/// Lift one raw storage value to the logical kind of a schema column.
///
/// `date` columns decode their millisecond epoch, `bool` columns compare
/// against `1`, `json` columns parse their text with a silent fallback to
/// the raw string when parsing fails.
#[must_use]
pub fn decode_column_value(kind: &ColumnKind, raw: DbValue) -> DbValue {
    match (kind, raw) {
        (ColumnKind::Date { .. }, DbValue::Int(millis)) => {
            match chrono::DateTime::from_timestamp_millis(millis) {
                Some(dt) => DbValue::Timestamp(dt.naive_utc()),
                None => DbValue::Int(millis),
            }
        }
        (ColumnKind::Bool { .. }, DbValue::Int(v)) => DbValue::Bool(v == 1),
        (ColumnKind::Json { .. }, DbValue::Text(text)) => {
            match serde_json::from_str(&text) {
                Ok(json) => DbValue::Json(json),
                Err(_) => DbValue::Text(text),
            }
        }
        (_, raw) => raw,
    }
}

/// Decode every row of a result set against a table schema, producing
/// logical [`Row`] maps. Columns the schema does not know pass through.
#[must_use]
pub fn decode_result_set(table: &TableSchema, result_set: ResultSet) -> Vec<Row> {
    result_set
        .into_rows()
        .into_iter()
        .map(|row| decode_row(table, row))
        .collect()
}

/// Render a logical value as JSON for table export.
///
/// Timestamps are emitted as millisecond epochs; JSON columns stay nested
/// objects rather than strings; blobs become byte arrays.
#[must_use]
pub fn db_value_to_json(value: &DbValue) -> serde_json::Value {
    match value {
        DbValue::Int(i) => serde_json::Value::from(*i),
        DbValue::Float(f) => serde_json::Value::from(*f),
        DbValue::Text(s) => serde_json::Value::from(s.clone()),
        DbValue::Bool(b) => serde_json::Value::from(*b),
        DbValue::Timestamp(dt) => serde_json::Value::from(dt.and_utc().timestamp_millis()),
        DbValue::Json(json) => json.clone(),
        DbValue::Null => serde_json::Value::Null,
        DbValue::Blob(bytes) => serde_json::Value::from(bytes.clone()),
    }
}

/// Lift a JSON value to the logical kind of a schema column, for import.
///
/// Dates accept either a millisecond epoch or an ISO-8601 string.
///
/// # Errors
///
/// Returns a human-readable description of the mismatch.
pub fn json_to_column_value(
    kind: &ColumnKind,
    value: &serde_json::Value,
) -> Result<DbValue, String> {
    if value.is_null() {
        return Ok(DbValue::Null);
    }
    match kind {
        ColumnKind::Int { .. } => value
            .as_i64()
            .map(DbValue::Int)
            .ok_or_else(|| format!("expected integer, got {value}")),
        ColumnKind::Real { .. } => value
            .as_f64()
            .map(DbValue::Float)
            .ok_or_else(|| format!("expected number, got {value}")),
        ColumnKind::Text { .. } => value
            .as_str()
            .map(|s| DbValue::Text(s.to_owned()))
            .ok_or_else(|| format!("expected string, got {value}")),
        ColumnKind::Bool { .. } => value
            .as_bool()
            .map(DbValue::Bool)
            .ok_or_else(|| format!("expected boolean, got {value}")),
        ColumnKind::Date { .. } => {
            if let Some(millis) = value.as_i64() {
                return chrono::DateTime::from_timestamp_millis(millis)
                    .map(|dt| DbValue::Timestamp(dt.naive_utc()))
                    .ok_or_else(|| format!("timestamp {millis} out of range"));
            }
            if let Some(text) = value.as_str() {
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
                    return Ok(DbValue::Timestamp(dt.naive_utc()));
                }
                if let Ok(dt) =
                    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                {
                    return Ok(DbValue::Timestamp(dt));
                }
            }
            Err(format!("expected epoch millis or ISO-8601 date, got {value}"))
        }
        ColumnKind::Json { .. } => Ok(DbValue::Json(value.clone())),
    }
}

/// Decode a single name-keyed row against a table schema.
#[must_use]
pub fn decode_row(table: &TableSchema, row: Row) -> Row {
    row.into_iter()
        .map(|(name, raw)| {
            let decoded = match table.find_column(&name) {
                Some(column) => decode_column_value(&column.kind, raw),
                None => raw,
            };
            (name, decoded)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ColumnDef;
    use crate::schema::json_shape::JsonShape;
    use chrono::DateTime;
    use serde_json::json;

    fn table() -> TableSchema {
        TableSchema::new("events")
            .column(ColumnDef::int("id").primary())
            .column(ColumnDef::date("at"))
            .column(ColumnDef::bool("done"))
            .column(ColumnDef::json("payload", JsonShape::object([("k", JsonShape::Int)])))
    }

    #[test]
    fn encode_covers_every_kind() {
        let dt = DateTime::from_timestamp_millis(1_700_000_000_123)
            .unwrap()
            .naive_utc();
        assert_eq!(encode_value(&DbValue::Int(5)), Value::Integer(5));
        assert_eq!(encode_value(&DbValue::Bool(true)), Value::Integer(1));
        assert_eq!(
            encode_value(&DbValue::Timestamp(dt)),
            Value::Integer(1_700_000_000_123)
        );
        assert_eq!(
            encode_value(&DbValue::Json(json!({"k": 1}))),
            Value::Text("{\"k\":1}".into())
        );
        assert_eq!(encode_value(&DbValue::Null), Value::Null);
    }

    #[test]
    fn decode_round_trips_encode() {
        let table = table();
        let dt = DateTime::from_timestamp_millis(1_700_000_000_123)
            .unwrap()
            .naive_utc();

        for (column, logical) in [
            ("at", DbValue::Timestamp(dt)),
            ("done", DbValue::Bool(true)),
            ("done", DbValue::Bool(false)),
            ("payload", DbValue::Json(json!({"k": 2}))),
            ("id", DbValue::Int(9)),
        ] {
            let kind = &table.find_column(column).unwrap().kind;
            let stored = match encode_value(&logical) {
                Value::Integer(i) => DbValue::Int(i),
                Value::Real(f) => DbValue::Float(f),
                Value::Text(s) => DbValue::Text(s),
                Value::Blob(b) => DbValue::Blob(b),
                Value::Null => DbValue::Null,
            };
            assert_eq!(decode_column_value(kind, stored), logical);
        }
    }

    #[test]
    fn malformed_json_falls_back_to_raw_text() {
        let table = table();
        let kind = &table.find_column("payload").unwrap().kind;
        assert_eq!(
            decode_column_value(kind, DbValue::Text("{not json".into())),
            DbValue::Text("{not json".into())
        );
    }

    #[test]
    fn unknown_columns_pass_through() {
        let table = table();
        let row: Row = [("rowcount".to_string(), DbValue::Int(3))].into_iter().collect();
        assert_eq!(
            decode_row(&table, row).get("rowcount"),
            Some(&DbValue::Int(3))
        );
    }
}
