use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Rebuild a JSON value with every object's keys in ascending order
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, canonicalize(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Canonical text form: sorted keys, two-space indentation, one trailing newline
pub fn to_canonical_string(value: &Value) -> Result<String> {
    let mut text = serde_json::to_string_pretty(&canonicalize(value.clone()))?;
    text.push('\n');
    Ok(text)
}

/// Serialize any document into canonical JSON text
pub fn serialize_document<T: Serialize>(document: &T) -> Result<String> {
    to_canonical_string(&serde_json::to_value(document)?)
}
