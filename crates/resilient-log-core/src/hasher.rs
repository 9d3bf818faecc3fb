//! Content hashing for idempotent delivery.
//!
//! A document's idempotency key is `sha256(canonical_json(deep_sorted(doc)))`.
//! Targets use it as the write key so that re-delivering a document the sink
//! already holds is a conflict, not a duplicate record.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Returns a copy of `value` where every object, at every depth, has its
/// keys in lexicographic order. Scalars and array order are unchanged.
pub fn deep_sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            let mut sorted = Map::new();
            for (key, inner) in entries {
                sorted.insert(key.clone(), deep_sorted(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(deep_sorted).collect()),
        scalar => scalar.clone(),
    }
}

/// Serializes a value to its canonical compact JSON form.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&deep_sorted(&value))
}

/// Hex-encoded SHA-256 of the canonical JSON form of `value`.
///
/// Two values that are deeply equal as unordered mappings hash equally,
/// whatever order their keys were inserted in.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let canonical = canonical_json(value)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}
