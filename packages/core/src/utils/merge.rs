//! JSON merge patch (RFC 7396).
//!
//! Record heads are mutated exclusively through this function: keys set to
//! null are removed, nested objects merge recursively, and any non-object
//! patch replaces the target wholesale.

use serde_json::{Map, Value};

/// Apply `patch` to `target` following RFC 7396.
pub fn merge_patch(target: Value, patch: Value) -> Value {
    let patch_obj = match patch {
        Value::Object(obj) => obj,
        other => return other,
    };

    let mut merged = match target {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };

    for (key, value) in patch_obj {
        if value.is_null() {
            merged.remove(&key);
        } else {
            let existing = merged.remove(&key).unwrap_or(Value::Object(Map::new()));
            merged.insert(key, merge_patch(existing, value));
        }
    }

    Value::Object(merged)
}
