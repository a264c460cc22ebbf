use log::*;
use serde_json::Value;

/// True if every key and value in `part` also appears in `complete`. Arrays must match element by element, and a
/// `null` in `part` matches anything.
pub fn json_is_subset_of(part: &str, complete: &str) -> bool {
    let part: Value = serde_json::from_str(part).expect("Invalid JSON");
    let complete: Value = serde_json::from_str(complete).expect("Invalid JSON");
    value_is_subset_of(&part, &complete)
}

pub fn value_is_subset_of(part: &Value, complete: &Value) -> bool {
    match (part, complete) {
        (Value::Null, _) => true,
        (Value::Object(part), Value::Object(complete)) => part.iter().all(|(key, value)| match complete.get(key) {
            Some(other) => {
                let matched = value_is_subset_of(value, other);
                if !matched {
                    error!("Value mismatch for {key}: {value} != {other}");
                }
                matched
            },
            None => {
                error!("Key not found: {key}");
                false
            },
        }),
        (Value::Object(_), _) => {
            error!("Expected an object, got {complete}");
            false
        },
        (Value::Array(part), Value::Array(complete)) => {
            if part.len() != complete.len() {
                error!("Array length mismatch: {} != {}", part.len(), complete.len());
                return false;
            }
            part.iter().zip(complete).all(|(p, c)| value_is_subset_of(p, c))
        },
        (Value::Array(_), _) => {
            error!("Expected an array, got {complete}");
            false
        },
        _ => part == complete,
    }
}
