//! Baseline Snapshot and Assignment State
//!
//! Both are built together from a freshly loaded source object. The baseline
//! records what was persisted and only changes on the next load/commit cycle;
//! the assignment state is the live arrangement the operator is editing.

use rule_attach_types::Rule;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::path::{resolve_in, ParamIndexMap};
use crate::slots::{Slot, SlotRegistry, ValueShape};

/// Rules persisted per slot at load time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaselineSnapshot {
    slots: HashMap<String, Vec<Rule>>,
}

impl BaselineSnapshot {
    pub fn assigned(&self, slot_key: &str) -> &[Rule] {
        self.slots.get(slot_key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Membership against the baseline only; pending changes never affect it
    pub fn is_originally_assigned(&self, slot_key: &str, rule_id: &str) -> bool {
        self.position(slot_key, rule_id).is_some()
    }

    /// Baseline position of a rule within a slot
    pub fn position(&self, slot_key: &str, rule_id: &str) -> Option<usize> {
        self.assigned(slot_key).iter().position(|r| r.id == rule_id)
    }

    /// Fold an applied operation's result into the baseline
    pub(crate) fn absorb(&mut self, slot_key: &str, contents: Vec<Rule>) {
        self.slots.insert(slot_key.to_string(), contents);
    }
}

/// Live slot → rules map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentState {
    slots: HashMap<String, Vec<Rule>>,
}

impl AssignmentState {
    pub fn currently_assigned(&self, slot_key: &str) -> &[Rule] {
        self.slots.get(slot_key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, slot_key: &str, rule_id: &str) -> bool {
        self.currently_assigned(slot_key)
            .iter()
            .any(|r| r.id == rule_id)
    }

    pub fn is_assigned_anywhere(&self, rule_id: &str) -> bool {
        self.slots
            .values()
            .any(|rules| rules.iter().any(|r| r.id == rule_id))
    }

    pub(crate) fn remove(&mut self, slot_key: &str, rule_id: &str) -> Option<Rule> {
        let rules = self.slots.get_mut(slot_key)?;
        let index = rules.iter().position(|r| r.id == rule_id)?;
        Some(rules.remove(index))
    }

    pub(crate) fn insert(&mut self, slot_key: &str, index: usize, rule: Rule) {
        let rules = self.slots.entry(slot_key.to_string()).or_default();
        let index = index.min(rules.len());
        rules.insert(index, rule);
    }

    pub(crate) fn push(&mut self, slot_key: &str, rule: Rule) {
        self.slots.entry(slot_key.to_string()).or_default().push(rule);
    }

    /// Compare per slot, treating a missing slot as empty
    pub fn matches(&self, other: &HashMap<String, Vec<Rule>>) -> bool {
        let keys = self.slots.keys().chain(other.keys());
        keys.into_iter().all(|key| {
            self.currently_assigned(key)
                == other.get(key).map(Vec::as_slice).unwrap_or(&[])
        })
    }
}

/// Build both snapshots from a raw source object.
pub fn initialize(
    registry: &SlotRegistry,
    catalog: &[Rule],
    indices: &ParamIndexMap,
    source: &Value,
) -> (BaselineSnapshot, AssignmentState) {
    let mut slots = HashMap::new();
    for slot in registry.all_slots() {
        let Some(path) = resolve_in(slot, indices) else {
            continue;
        };
        let rules = extract_slot(slot, source.pointer(&path), catalog);
        if !rules.is_empty() {
            slots.insert(slot.key.clone(), rules);
        }
    }
    (
        BaselineSnapshot {
            slots: slots.clone(),
        },
        AssignmentState { slots },
    )
}

/// Read one slot's assignment according to its value shape
fn extract_slot(slot: &Slot, value: Option<&Value>, catalog: &[Rule]) -> Vec<Rule> {
    let Some(value) = value else {
        return Vec::new();
    };
    match (slot.value_shape, value) {
        (_, Value::Null) => Vec::new(),
        (ValueShape::Reference, Value::Object(_)) => {
            reference_rule(slot, value, catalog).into_iter().collect()
        }
        (ValueShape::Name, Value::String(name)) if !name.is_empty() => {
            vec![named_rule(slot, name, catalog)]
        }
        (ValueShape::NameList, Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .map(|name| named_rule(slot, name, catalog))
            .collect(),
        (shape, other) => {
            warn!(
                "Slot {} expected a {:?} value, found {}; treating as empty",
                slot.key, shape, other
            );
            Vec::new()
        }
    }
}

fn reference_rule(slot: &Slot, value: &Value, catalog: &[Rule]) -> Option<Rule> {
    let id = value.get("id").and_then(Value::as_str)?;
    if let Some(rule) = catalog.iter().find(|r| r.id == id) {
        return Some(rule.clone());
    }
    warn!("Rule {} in slot {} is not in the catalog", id, slot.key);
    let name = value.get("name").and_then(Value::as_str).unwrap_or(id);
    Some(Rule::new(id, name, slot.fallback_type()))
}

fn named_rule(slot: &Slot, name: &str, catalog: &[Rule]) -> Rule {
    let mut by_name = catalog.iter().filter(|r| r.name == name);
    let preferred = catalog
        .iter()
        .find(|r| r.name == name && slot.accepts(&r.rule_type));
    if let Some(rule) = preferred.or_else(|| by_name.next()) {
        return rule.clone();
    }
    warn!("Rule '{}' in slot {} is not in the catalog", name, slot.key);
    Rule::new(name, name, slot.fallback_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<Rule> {
        vec![
            Rule::new("r-bp", "Before Prov", "BeforeProvisioning"),
            Rule::new("r-map", "Map Users", "BuildMap"),
            Rule::new("r-nat-a", "a", "ConnectorAfterCreate"),
            Rule::new("r-nat-b", "b", "ConnectorAfterModify"),
            Rule::new("r-page", "Paging", "WebServiceBeforeOperationRule"),
        ]
    }

    fn source() -> Value {
        json!({
            "id": "src-1",
            "beforeProvisioningRule": {"type": "RULE", "id": "r-bp", "name": "Before Prov"},
            "accountCorrelationRule": null,
            "connectorAttributes": {
                "buildMapRule": "Map Users",
                "nativeRules": ["a", "b"],
                "connectionParameters": [
                    {"operationType": "Account Aggregation", "beforeRule": "Paging"}
                ]
            }
        })
    }

    #[test]
    fn test_initialize_extracts_every_shape() {
        let registry = SlotRegistry::builtin().unwrap();
        let source = source();
        let indices = ParamIndexMap::derive(&registry, &source);
        let (baseline, assignment) = initialize(&registry, &catalog(), &indices, &source);

        assert_eq!(baseline.assigned("before-provisioning-rule")[0].id, "r-bp");
        assert_eq!(baseline.assigned("build-map-rule")[0].id, "r-map");
        let natives: Vec<_> = baseline
            .assigned("native-rules")
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(natives, vec!["a", "b"]);
        assert_eq!(
            baseline.assigned("aggregation-before-operation-rule")[0].id,
            "r-page"
        );
        assert!(baseline.assigned("account-correlation-rule").is_empty());

        // assignment starts equal to the baseline
        for slot in registry.all_slots() {
            assert_eq!(
                assignment.currently_assigned(&slot.key),
                baseline.assigned(&slot.key)
            );
        }
    }

    #[test]
    fn test_is_originally_assigned_ignores_live_changes() {
        let registry = SlotRegistry::builtin().unwrap();
        let source = source();
        let indices = ParamIndexMap::derive(&registry, &source);
        let (baseline, mut assignment) = initialize(&registry, &catalog(), &indices, &source);

        assignment.remove("build-map-rule", "r-map");
        assert!(!assignment.contains("build-map-rule", "r-map"));
        assert!(baseline.is_originally_assigned("build-map-rule", "r-map"));
    }

    #[test]
    fn test_unknown_rules_are_synthesized() {
        let registry = SlotRegistry::builtin().unwrap();
        let source = json!({
            "id": "src-1",
            "managerCorrelationRule": {"type": "RULE", "id": "r-x", "name": "Mystery"},
            "connectorAttributes": {"jdbcProvisionRule": "Provision"}
        });
        let indices = ParamIndexMap::derive(&registry, &source);
        let (baseline, _) = initialize(&registry, &[], &indices, &source);

        let manager = &baseline.assigned("manager-correlation-rule")[0];
        assert_eq!(manager.name, "Mystery");
        assert_eq!(manager.rule_type, "ManagerCorrelation");

        let jdbc = &baseline.assigned("jdbc-provision-rule")[0];
        assert_eq!(jdbc.id, "Provision");
        assert_eq!(jdbc.rule_type, "JDBCProvision");
    }

    #[test]
    fn test_unresolved_scope_starts_empty() {
        let registry = SlotRegistry::builtin().unwrap();
        let source = json!({"id": "src-1"});
        let indices = ParamIndexMap::derive(&registry, &source);
        let (baseline, _) = initialize(&registry, &catalog(), &indices, &source);
        assert!(baseline
            .assigned("aggregation-before-operation-rule")
            .is_empty());
    }

    #[test]
    fn test_wrong_shape_treated_as_empty() {
        let registry = SlotRegistry::builtin().unwrap();
        let source = json!({"id": "s", "connectorAttributes": {"nativeRules": "a"}});
        let indices = ParamIndexMap::derive(&registry, &source);
        let (baseline, _) = initialize(&registry, &catalog(), &indices, &source);
        assert!(baseline.assigned("native-rules").is_empty());
    }
}
