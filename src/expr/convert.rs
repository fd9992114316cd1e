//! Value conversion between the engine's neutral JSON values and CEL values

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use cel_interpreter::objects::{Key, Map, Value as CelValue};
use serde_json::Value as JsonValue;

/// Lift a JSON value into the CEL value space
pub(crate) fn to_cel(value: &JsonValue) -> CelValue {
    match value {
        JsonValue::Null => CelValue::Null,
        JsonValue::Bool(b) => CelValue::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CelValue::Int(i)
            } else if let Some(u) = n.as_u64() {
                CelValue::UInt(u)
            } else if let Some(f) = n.as_f64() {
                CelValue::Float(f)
            } else {
                CelValue::Null
            }
        }
        JsonValue::String(s) => CelValue::String(s.clone().into()),
        JsonValue::Array(items) => {
            let converted: Vec<CelValue> = items.iter().map(to_cel).collect();
            CelValue::List(converted.into())
        }
        JsonValue::Object(fields) => {
            let mut map: HashMap<Key, CelValue> = HashMap::with_capacity(fields.len());
            for (k, v) in fields {
                map.insert(Key::from(k.clone()), to_cel(v));
            }
            CelValue::Map(Map { map: Arc::new(map) })
        }
    }
}

/// Lower a CEL value back into the JSON value space
pub(crate) fn from_cel(value: &CelValue) -> JsonValue {
    match value {
        CelValue::Null => JsonValue::Null,
        CelValue::Bool(b) => JsonValue::Bool(*b),
        CelValue::Int(i) => JsonValue::Number((*i).into()),
        CelValue::UInt(u) => JsonValue::Number((*u).into()),
        CelValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        CelValue::String(s) => JsonValue::String(s.to_string()),
        CelValue::Bytes(bytes) => JsonValue::String(
            base64::engine::general_purpose::STANDARD.encode(bytes.as_ref()),
        ),
        CelValue::List(items) => JsonValue::Array(items.iter().map(from_cel).collect()),
        CelValue::Map(map) => {
            let mut fields = serde_json::Map::new();
            for (k, v) in map.map.as_ref() {
                fields.insert(key_to_string(k), from_cel(v));
            }
            JsonValue::Object(fields)
        }
        // durations, timestamps, and functions have no JSON counterpart
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn key_to_string(key: &Key) -> String {
    match key {
        Key::String(s) => s.to_string(),
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
    }
}
