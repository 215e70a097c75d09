//! Deep-merge of layered YAML trees (spec §4.1 merge order: maps merge
//! key-wise, lists and scalars are replaced wholesale by the later layer).

use serde_yaml::Value;

/// Merge `overlay` on top of `base`. Mappings are merged recursively;
/// sequences and scalars in `overlay` replace whatever `base` had.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Mapping(mut base_map), Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => deep_merge(base_val, overlay_val),
                    None => overlay_val,
                };
                base_map.insert(key, merged);
            }
            Value::Mapping(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge `overlay` under a single top-level key of `base`, e.g. folding
/// `starrocks/connection_pool.yaml` under `connection_pool:` (spec §4.1
/// item 2, "applied under a conventional key").
pub fn merge_under_key(base: Value, key: &str, overlay: Value) -> Value {
    let mut base_map = match base {
        Value::Mapping(m) => m,
        Value::Null => serde_yaml::Mapping::new(),
        other => {
            let mut m = serde_yaml::Mapping::new();
            m.insert(Value::String("_root".into()), other);
            m
        }
    };
    let existing = base_map.remove(Value::String(key.to_string()));
    let merged = match existing {
        Some(existing) => deep_merge(existing, overlay),
        None => overlay,
    };
    base_map.insert(Value::String(key.to_string()), merged);
    Value::Mapping(base_map)
}

/// Recursively interpolate `{tenant_slug}` in every string leaf. No other
/// template syntax is supported (spec §4.1 "Path templating").
pub fn interpolate_tenant_slug(value: &mut Value, slug: &str) {
    match value {
        Value::String(s) => {
            if s.contains("{tenant_slug}") {
                *s = s.replace("{tenant_slug}", slug);
            }
        }
        Value::Sequence(seq) => {
            for item in seq {
                interpolate_tenant_slug(item, slug);
            }
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                interpolate_tenant_slug(v, slug);
            }
        }
        _ => {}
    }
}
