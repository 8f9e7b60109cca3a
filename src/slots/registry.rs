//! Slot Registry
//!
//! Static catalog of rule slots, loaded once at startup either from the
//! embedded `config/slots.yaml` or from an operator-supplied file.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::definition::Slot;
use crate::error::RegistryError;

const BUILTIN_SLOTS: &str = include_str!("../../config/slots.yaml");

#[derive(Debug, Deserialize)]
struct RegistryFile {
    slots: Vec<Slot>,
}

/// Read-only catalog of slots, in declaration order
#[derive(Debug, Clone)]
pub struct SlotRegistry {
    slots: Vec<Slot>,
}

impl SlotRegistry {
    /// Build a registry from slot definitions, validating each one
    pub fn new(slots: Vec<Slot>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for slot in &slots {
            if !seen.insert(slot.key.as_str()) {
                return Err(RegistryError::DuplicateSlot {
                    key: slot.key.clone(),
                });
            }
            slot.validate()
                .map_err(|reason| RegistryError::InvalidSlot {
                    key: slot.key.clone(),
                    reason,
                })?;
        }
        Ok(Self { slots })
    }

    /// The built-in identity-governance slot catalog
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_yaml_str(BUILTIN_SLOTS)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        Self::new(file.slots)
    }

    /// Load a registry file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_yaml_str(&yaml)?;
        info!(
            "Loaded {} slots from {}",
            registry.slots.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn lookup(&self, key: &str) -> Result<&Slot, RegistryError> {
        self.slots
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| RegistryError::UnknownSlot {
                key: key.to_string(),
            })
    }

    pub fn all_slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::{Cardinality, ValueShape};
    use std::io::Write;

    #[test]
    fn test_builtin_registry_loads() {
        let registry = SlotRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 8);

        let native = registry.lookup("native-rules").unwrap();
        assert_eq!(native.cardinality, Cardinality::Multi);
        assert_eq!(native.value_shape, ValueShape::NameList);

        let before = registry.lookup("before-provisioning-rule").unwrap();
        assert_eq!(before.reference_type.as_deref(), Some("RULE"));

        let scoped = registry
            .lookup("aggregation-before-operation-rule")
            .unwrap();
        assert!(scoped.is_scoped());
    }

    #[test]
    fn test_unknown_slot() {
        let registry = SlotRegistry::builtin().unwrap();
        let err = registry.lookup("no-such-slot").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownSlot { key } if key == "no-such-slot"));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let yaml = r#"
slots:
  - key: a
    label: A
    path: /a
    cardinality: single
    value_shape: name
    allowed_types: [BuildMap]
  - key: a
    label: A again
    path: /b
    cardinality: single
    value_shape: name
    allowed_types: [BuildMap]
"#;
        let err = SlotRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSlot { .. }));
    }

    #[test]
    fn test_invalid_slot_rejected() {
        let yaml = r#"
slots:
  - key: natives
    label: Natives
    path: /connectorAttributes/nativeRules
    cardinality: multi
    value_shape: name
    allowed_types: [ConnectorAfterCreate]
"#;
        let err = SlotRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSlot { key, .. } if key == "natives"));
    }

    #[test]
    fn test_pool_key_rejected() {
        // a slot keyed "Pool" could never be named as a move target
        let yaml = r#"
slots:
  - key: Pool
    label: Pool
    path: /pool
    cardinality: single
    value_shape: name
    allowed_types: [Transform]
"#;
        let err = SlotRegistry::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidSlot { key, .. } if key == "Pool"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "slots:\n  - key: only\n    label: Only\n    path: /only\n    cardinality: single\n    value_shape: name\n    allowed_types: [BuildMap]"
        )
        .unwrap();

        let registry = SlotRegistry::load(file.path()).unwrap();
        assert_eq!(registry.keys().collect::<Vec<_>>(), vec!["only"]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = SlotRegistry::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
