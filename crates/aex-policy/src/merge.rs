// Path: crates/aex-policy/src/merge.rs
//! Deep-merge of plugin patches over a documented subset of request
//! fields (§4.4): `temperature`, `max_tokens`, `system message prepend`.
//! Conflicting writes to the same path are resolved by last-plugin-wins,
//! which falls out naturally from folding patches in declared order.

use serde_json::Value;

/// Fields a plugin patch is allowed to touch. Anything else in a patch is
/// ignored rather than erroring, so a misbehaving plugin cannot widen its
/// own authority by naming an arbitrary field.
const PATCHABLE_FIELDS: &[&str] = &["temperature", "max_tokens", "system_prepend"];

/// Merges `patch` into `base`, restricted to `PATCHABLE_FIELDS`, with
/// `patch`'s values winning on conflict. Object-valued fields are merged
/// recursively; everything else is a straight overwrite.
pub fn apply_patch(base: &mut Value, patch: &Value) {
    let Some(patch_obj) = patch.as_object() else { return };
    let Some(base_obj) = base.as_object_mut() else { return };

    for field in PATCHABLE_FIELDS {
        if let Some(incoming) = patch_obj.get(*field) {
            match (base_obj.get_mut(*field), incoming) {
                (Some(existing), Value::Object(_)) if existing.is_object() => {
                    deep_merge(existing, incoming);
                }
                _ => {
                    base_obj.insert(field.to_string(), incoming.clone());
                }
            }
        }
    }
}

fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (k, v) in patch_map {
                deep_merge(base_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (base_slot, patch_value) => {
            *base_slot = patch_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn last_plugin_wins_on_scalar_conflict() {
        let mut base = json!({"temperature": 0.7});
        apply_patch(&mut base, &json!({"temperature": 0.1}));
        apply_patch(&mut base, &json!({"temperature": 0.9}));
        assert_eq!(base["temperature"], json!(0.9));
    }

    #[test]
    fn unpatchable_field_is_ignored() {
        let mut base = json!({"messages": [{"role": "user", "content": "hi"}]});
        apply_patch(&mut base, &json!({"messages": []}));
        assert_eq!(base["messages"], json!([{"role": "user", "content": "hi"}]));
    }

    #[test]
    fn object_valued_field_merges_recursively() {
        let mut base = json!({});
        apply_patch(&mut base, &json!({"system_prepend": {"a": 1}}));
        apply_patch(&mut base, &json!({"system_prepend": {"b": 2}}));
        assert_eq!(base["system_prepend"], json!({"a": 1, "b": 2}));
    }
}
