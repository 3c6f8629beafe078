//! Canonical JSON encoder for field-key derivation.

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanonJsonError {
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("non-finite float values are not allowed")]
    NonFiniteFloat,
}

/// Serialize a JSON value to its canonical string form.
///
/// Canonical rules:
/// - object keys sorted by UTF-8 byte order, recursively
/// - no insignificant whitespace
/// - reject NaN/Infinity floats
///
/// Two logically equal values produce byte-identical output regardless of
/// the key order they were built in.
pub fn to_canon_json_string(value: &Value) -> Result<String, CanonJsonError> {
    ensure_finite(value)?;
    let canon = canon_value(value);
    Ok(serde_json::to_string(&canon)?)
}

fn ensure_finite(value: &Value) -> Result<(), CanonJsonError> {
    match value {
        Value::Number(n) => {
            if let Some(f) = n.as_f64()
                && !f.is_finite()
            {
                return Err(CanonJsonError::NonFiniteFloat);
            }
            Ok(())
        }
        Value::Array(values) => values.iter().try_for_each(ensure_finite),
        Value::Object(map) => map.values().try_for_each(ensure_finite),
        _ => Ok(()),
    }
}

fn canon_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut canon = Map::new();
            for (key, value) in entries {
                canon.insert(key.clone(), canon_value(value));
            }
            Value::Object(canon)
        }
        Value::Array(values) => Value::Array(values.iter().map(canon_value).collect()),
        other => other.clone(),
    }
}
