//! Converts a native `MySqlRow` into the canonical `(name, type) + row map`
//! shape every capability result uses, normalising binary columns to text.

use serde_json::Value;
use sqlx::{Column, Row, TypeInfo};

use dsengine_capability::{ColumnDescriptor, ResultRow};

pub fn describe_columns(row: &sqlx::mysql::MySqlRow) -> Vec<ColumnDescriptor> {
    row.columns()
        .iter()
        .map(|c| ColumnDescriptor {
            name: c.name().to_string(),
            data_type: c.type_info().name().to_string(),
        })
        .collect()
}

pub fn to_result_row(row: &sqlx::mysql::MySqlRow) -> ResultRow {
    let mut map = ResultRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn column_value(row: &sqlx::mysql::MySqlRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "YEAR" => row
            .try_get::<i32, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BIGINT" => row
            .try_get::<i64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT" => row
            .try_get::<f32, _>(idx)
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        "DOUBLE" => row
            .try_get::<f64, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BOOLEAN" => row
            .try_get::<bool, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
        "BLOB" | "VARBINARY" | "BINARY" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|bytes| Value::from(hex_encode(&bytes)))
            .unwrap_or(Value::Null),
        // VARCHAR, TEXT, DECIMAL, DATE, DATETIME, TIMESTAMP, JSON and
        // anything unrecognised are normalised to text.
        _ => row
            .try_get::<String, _>(idx)
            .map(Value::from)
            .unwrap_or(Value::Null),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
