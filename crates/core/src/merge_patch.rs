//! JSON merge patch (RFC 7386) computation.
//!
//! Status commits are sent as the difference between the snapshot read
//! at the start of a pass and the locally mutated copy, so fields the
//! pass did not touch are never overwritten.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Compute the merge patch that turns `before` into `after`.
///
/// Removed object keys become `null`; arrays and scalars are replaced
/// wholesale. Returns an empty object when nothing changed.
pub fn diff(before: &Value, after: &Value) -> Value {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, b_val) in b {
                match a.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(a_val) if a_val != b_val => {
                        let nested = match (b_val, a_val) {
                            (Value::Object(_), Value::Object(_)) => diff(b_val, a_val),
                            _ => a_val.clone(),
                        };
                        patch.insert(key.clone(), nested);
                    }
                    Some(_) => {}
                }
            }
            for (key, a_val) in a {
                if !b.contains_key(key) {
                    patch.insert(key.clone(), a_val.clone());
                }
            }
            Value::Object(patch)
        }
        _ => after.clone(),
    }
}

/// Apply a merge patch to `target` in place.
pub fn apply(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let entry = target_map.entry(key.clone()).or_insert(Value::Null);
                apply(entry, value);
            }
        }
    }
}

/// Whether a patch produced by [`diff`] carries no changes.
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// Build a status-subresource patch from a snapshot and its mutated copy.
///
/// Only the `status` subtree is diffed. The snapshot's resource version
/// is pinned in `metadata` so the store rejects the write if the object
/// changed since the snapshot was taken.
pub fn status_patch<T: Serialize>(
    snapshot: &T,
    mutated: &T,
    resource_version: Option<&str>,
) -> Result<Value, CoreError> {
    let before = serde_json::to_value(snapshot)?;
    let after = serde_json::to_value(mutated)?;

    let empty = Value::Object(Map::new());
    let status = diff(
        before.get("status").unwrap_or(&empty),
        after.get("status").unwrap_or(&empty),
    );

    let mut patch = Map::new();
    if let Some(rv) = resource_version {
        patch.insert(
            "metadata".to_string(),
            serde_json::json!({ "resourceVersion": rv }),
        );
    }
    patch.insert("status".to_string(), status);
    Ok(Value::Object(patch))
}
