//! Settings merging
//!
//! Later sources override earlier ones field by field:
//! 1. scripts.cfg (base)
//! 2. scripts.cfg.d/*.cfg (sorted alphabetically)

use serde_yaml::Value;

/// Merge two YAML values recursively
///
/// Mappings merge key by key. For any other pair the overlay wins, except
/// that a null overlay keeps the base value.
pub fn merge_yaml_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            let mut result = base_map.clone();

            for (key, overlay_value) in overlay_map {
                let merged = match result.get(key) {
                    Some(base_value) => merge_yaml_values(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                result.insert(key.clone(), merged);
            }

            Value::Mapping(result)
        }

        (_, Value::Null) => base.clone(),

        _ => overlay.clone(),
    }
}

/// Merge a sequence of documents in order
pub fn merge_all(values: &[Value]) -> Value {
    values
        .iter()
        .fold(Value::Null, |acc, value| merge_yaml_values(&acc, value))
}
