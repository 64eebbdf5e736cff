//! Converts a native `PgRow` into the canonical `(name, type) + row map`
//! shape every capability result uses, normalising binary columns to text.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use sqlx::{Column, Row, TypeInfo};

use dsengine_capability::{ColumnDescriptor, ResultRow};

pub fn describe_columns(row: &sqlx::postgres::PgRow) -> Vec<ColumnDescriptor> {
    row.columns()
        .iter()
        .map(|c| ColumnDescriptor {
            name: c.name().to_string(),
            data_type: c.type_info().name().to_string(),
        })
        .collect()
}

pub fn to_result_row(row: &sqlx::postgres::PgRow) -> ResultRow {
    let mut map = ResultRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn column_value(row: &sqlx::postgres::PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "INT2" => row
            .try_get::<i16, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<i32, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<f32, _>(idx)
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<bool, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<NaiveDateTime, _>(idx)
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .map(|v| Value::from(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<NaiveDate, _>(idx)
            .map(|v| Value::from(v.to_string()))
            .unwrap_or(Value::Null),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::from(hex_encode(&bytes)))
            .unwrap_or(Value::Null),
        // TEXT, VARCHAR, BPCHAR, JSON, JSONB, UUID, NUMERIC and anything
        // else unrecognised are normalised to text, per the canonical row
        // shape every upper layer expects.
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
