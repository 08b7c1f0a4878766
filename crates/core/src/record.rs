// Helpers for loosely-typed CRM records

use serde_json::{Map, Value};

/// A CRM record as returned by the REST API or stored in an export file
pub type Record = Map<String, Value>;

/// Read a field as a number. Bitrix24 sends money and ids as strings
/// (`"123.00"`), so numeric strings are accepted too.
pub fn field_number(record: &Record, field: &str) -> Option<f64> {
    record.get(field).and_then(value_number)
}

/// Coerce a single JSON value to a number
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Read a field as text; null and missing fields yield `None`
pub fn field_text(record: &Record, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(display_value(other)),
    }
}

/// Render any JSON value for a human reader
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    }
}
