//! Configuration merge logic
//!
//! - Objects: deep-merge by key
//! - Arrays: REPLACE (last wins)
//! - Scalars: override (last wins)

use serde_json::Value;

/// Deep merge two JSON values.
///
/// A `null` in the overlay overrides the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order (first is base, last has highest precedence)
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

/// Insert `value` at a dot-separated `path`, creating objects as needed.
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    if !root.is_object() {
        *root = Value::Object(serde_json::Map::new());
    }
    let mut current = root;
    let mut parts = path.split('.').peekable();
    while let Some(part) = parts.next() {
        let Value::Object(map) = current else {
            return;
        };
        if parts.peek().is_none() {
            map.insert(part.to_string(), value);
            return;
        }
        let entry = map
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(serde_json::Map::new());
        }
        current = entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"http_timeout_seconds": 30}), json!({"http_timeout_seconds": 5}));
        assert_eq!(result["http_timeout_seconds"], 5);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({"storage": {"provider": "local", "prefix": "dev"}});
        let overlay = json!({"storage": {"prefix": "prod"}});
        let result = deep_merge(base, overlay);
        assert_eq!(result["storage"]["prefix"], "prod");
        assert_eq!(result["storage"]["provider"], "local");
    }

    #[test]
    fn test_array_replace() {
        let result = deep_merge(json!({"tags": ["a", "b", "c"]}), json!({"tags": ["x"]}));
        assert_eq!(result["tags"], json!(["x"]));
    }

    #[test]
    fn test_null_override() {
        let result = deep_merge(json!({"storage": {"rest_url": "http://x"}}), json!({"storage": {"rest_url": null}}));
        assert!(result["storage"]["rest_url"].is_null());
    }

    #[test]
    fn test_merge_layers() {
        let builtin = json!({"storage": {"prefix": "dev"}, "http_timeout_seconds": 30});
        let file = json!({"http_timeout_seconds": 60});
        let env = json!({"storage": {"prefix": "preprod"}});
        let cli = json!({"http_timeout_seconds": 10});

        let result = merge_layers(vec![builtin, file, env, cli]);
        assert_eq!(result["http_timeout_seconds"], 10);
        assert_eq!(result["storage"]["prefix"], "preprod");
    }

    #[test]
    fn test_set_path() {
        let mut root = Value::Null;
        set_path(&mut root, "storage.prefix", json!("prod"));
        set_path(&mut root, "storage.bucket", json!("/srv"));
        set_path(&mut root, "http_timeout_seconds", json!(5));
        assert_eq!(root, json!({"storage": {"prefix": "prod", "bucket": "/srv"}, "http_timeout_seconds": 5}));
    }
}
