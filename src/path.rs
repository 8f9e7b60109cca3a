//! Path Resolver
//!
//! Turns a slot's path template into a concrete JSON Pointer. Scoped slots
//! get their `{index}` from a [`ParamIndexMap`] derived once when the source
//! is loaded; it is never recomputed mid-session.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::slots::{Slot, SlotRegistry, INDEX_PLACEHOLDER};

/// Connection-parameter index per scoped slot key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamIndexMap {
    indices: HashMap<String, usize>,
}

impl ParamIndexMap {
    /// Derive indices for every scoped slot from a loaded source object.
    ///
    /// A slot resolves to the first element of its scope collection whose
    /// scope field equals the configured value. Slots with no match are left
    /// out of the map.
    pub fn derive(registry: &SlotRegistry, source: &Value) -> Self {
        let mut indices = HashMap::new();
        for slot in registry.all_slots() {
            let Some(scope) = &slot.scope else {
                continue;
            };
            let position = source
                .pointer(&scope.collection)
                .and_then(Value::as_array)
                .and_then(|entries| {
                    entries.iter().position(|entry| {
                        entry.get(&scope.field).and_then(Value::as_str)
                            == Some(scope.equals.as_str())
                    })
                });
            match position {
                Some(index) => {
                    indices.insert(slot.key.clone(), index);
                }
                None => debug!(
                    "No '{}' = '{}' entry under {} for slot {}",
                    scope.field, scope.equals, scope.collection, slot.key
                ),
            }
        }
        Self { indices }
    }

    pub fn get(&self, slot_key: &str) -> Option<usize> {
        self.indices.get(slot_key).copied()
    }

    pub fn insert(&mut self, slot_key: impl Into<String>, index: usize) {
        self.indices.insert(slot_key.into(), index);
    }
}

/// Resolve a slot's concrete patch path.
///
/// Returns `None` for a scoped slot without an index. Unscoped templates come
/// back with any placeholder segment stripped.
pub fn resolve(slot: &Slot, index: Option<usize>) -> Option<String> {
    if slot.is_scoped() {
        let index = index?;
        return Some(slot.path.replace(INDEX_PLACEHOLDER, &index.to_string()));
    }
    if !slot.path.contains(INDEX_PLACEHOLDER) {
        return Some(slot.path.clone());
    }
    let stripped = slot
        .path
        .replace(&format!("/{INDEX_PLACEHOLDER}"), "")
        .replace(INDEX_PLACEHOLDER, "");
    Some(stripped)
}

/// Resolve using the session's index map
pub fn resolve_in(slot: &Slot, indices: &ParamIndexMap) -> Option<String> {
    resolve(slot, indices.get(&slot.key))
}
