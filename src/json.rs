//! Structural transforms over JSON values.

use serde_json::{Map, Value};

/// Recursively convert every number and boolean to its string form.
///
/// `null` is kept as `null`; arrays and objects keep their shape. Discord
/// snowflake ids exceed the 2^53 range JavaScript numbers represent exactly,
/// so payloads headed for browser clients go through this first.
pub fn deep_stringify(value: Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::String(s) => Value::String(s),
        Value::Array(items) => Value::Array(items.into_iter().map(deep_stringify).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, deep_stringify(v)))
                .collect::<Map<String, Value>>(),
        ),
    }
}
