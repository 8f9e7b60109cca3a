//! Slot definitions
//!
//! A slot is plain tagged data: cardinality and value shape are enums, and the
//! engine branches on them instead of dispatching through a type hierarchy.

use rule_attach_types::Rule;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Placeholder substituted with the connection-parameter index for scoped slots
pub const INDEX_PLACEHOLDER: &str = "{index}";

/// How many rules a slot may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// At most one rule
    Single,
    /// Ordered list of rules
    Multi,
}

/// How an assignment is written into the source object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    /// `{ "type": ..., "id": ..., "name": ... }`
    Reference,
    /// Bare rule name
    Name,
    /// Array of rule names
    NameList,
}

/// Selects which element of a parameter collection a scoped slot applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamScope {
    /// JSON Pointer to the array of connection parameters
    pub collection: String,
    /// Field compared on each element
    pub field: String,
    /// Value the field must equal
    pub equals: String,
}

/// One assignment target on a source configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub key: String,
    pub label: String,
    /// Patch path template (JSON Pointer, optionally with `{index}`)
    pub path: String,
    pub cardinality: Cardinality,
    pub value_shape: ValueShape,
    pub allowed_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ParamScope>,
}

impl Slot {
    pub fn is_scoped(&self) -> bool {
        self.scope.is_some()
    }

    pub fn is_multi(&self) -> bool {
        self.cardinality == Cardinality::Multi
    }

    /// Type gate
    pub fn accepts(&self, rule_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == rule_type)
    }

    /// Allowed types joined for messages
    pub fn allowed_display(&self) -> String {
        self.allowed_types.join(", ")
    }

    /// Type used for rules found on a source but missing from the catalog
    pub fn fallback_type(&self) -> &str {
        self.allowed_types
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Value written when `rule` alone occupies a single slot
    pub fn single_value(&self, rule: &Rule) -> Value {
        match self.value_shape {
            ValueShape::Reference => json!({
                "type": self.reference_type.as_deref().unwrap_or(rule.rule_type.as_str()),
                "id": rule.id,
                "name": rule.name,
            }),
            ValueShape::Name => Value::String(rule.name.clone()),
            ValueShape::NameList => json!([rule.name]),
        }
    }

    /// Value written for a multi slot's full list
    pub fn list_value(&self, rules: &[Rule]) -> Value {
        match self.value_shape {
            ValueShape::Reference => {
                Value::Array(rules.iter().map(|r| self.single_value(r)).collect())
            }
            ValueShape::Name | ValueShape::NameList => {
                Value::Array(rules.iter().map(|r| Value::String(r.name.clone())).collect())
            }
        }
    }

    /// Does a patch value denote this exact rule?
    ///
    /// Reference values match on id, names on name, lists on membership.
    pub fn value_denotes(&self, value: &Value, rule: &Rule) -> bool {
        match value {
            Value::Object(map) => map.get("id").and_then(Value::as_str) == Some(rule.id.as_str()),
            Value::String(name) => *name == rule.name,
            Value::Array(items) => items.iter().any(|item| self.value_denotes(item, rule)),
            _ => false,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("key must not be empty".into());
        }
        if self.key.eq_ignore_ascii_case(crate::engine::POOL) {
            return Err(format!("key '{}' is reserved for the pool", self.key));
        }
        if !self.path.starts_with('/') {
            return Err(format!("path '{}' is not a JSON Pointer", self.path));
        }
        if self.allowed_types.is_empty() {
            return Err("allowed_types must not be empty".into());
        }
        match (self.cardinality, self.value_shape) {
            (Cardinality::Single, ValueShape::NameList) => {
                return Err("single slots cannot use the name_list shape".into())
            }
            (Cardinality::Multi, ValueShape::Reference | ValueShape::Name) => {
                return Err("multi slots must use the name_list shape".into())
            }
            _ => {}
        }
        let placeholders = self.path.matches(INDEX_PLACEHOLDER).count();
        match (&self.scope, placeholders) {
            (Some(_), 1) => Ok(()),
            (Some(_), _) => Err(format!(
                "scoped slot path must contain exactly one {INDEX_PLACEHOLDER}"
            )),
            // unscoped templates may carry a placeholder; it is dropped on resolve
            (None, 0 | 1) => Ok(()),
            (None, _) => Err(format!("path has more than one {INDEX_PLACEHOLDER}")),
        }
    }
}
