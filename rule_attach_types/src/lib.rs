//! Rule Attach Types - Level 1 Foundation Types
//!
//! Pure data structures shared by the reconciliation engine, the source
//! repositories and the CLI. This crate depends on nothing else in the
//! workspace.
//!
//! ## Contents
//!
//! - [`Rule`]: an assignable connector/cloud rule from the catalog
//! - [`PatchOperation`] / [`PatchVerb`]: the JSON-Patch-like payload accepted by
//!   the source configuration API
//! - [`SourceSummary`]: list entry for a source configuration object

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RULES
// ============================================================================

/// An assignable rule.
///
/// Only `rule_type` takes part in slot compatibility checks; the engine treats
/// the rest as opaque identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: String,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        rule_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rule_type: rule_type.into(),
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.rule_type)
    }
}

// ============================================================================
// PATCH OPERATIONS
// ============================================================================

/// Patch verb. Serialized as the lowercase `op` strings the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchVerb {
    Add,
    Replace,
    Remove,
}

impl PatchVerb {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchVerb::Add => "add",
            PatchVerb::Replace => "replace",
            PatchVerb::Remove => "remove",
        }
    }
}

impl std::fmt::Display for PatchVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{op, path, value}` entry of a patch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchVerb,
    /// JSON Pointer into the source object
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl PatchOperation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchVerb::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: PatchVerb::Replace,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            op: PatchVerb::Remove,
            path: path.into(),
            value: None,
        }
    }
}

impl std::fmt::Display for PatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{} {} {}", self.op, self.path, value),
            None => write!(f, "{} {}", self.op, self.path),
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// Summary row for a source configuration object.
///
/// The full object is handled as raw JSON; only the fields needed for listing
/// are typed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SourceSummary {
    /// Build a summary from a full source object. Returns `None` when the
    /// object carries no string `id`.
    pub fn from_object(object: &Value) -> Option<Self> {
        let id = object.get("id")?.as_str()?.to_string();
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            name: text("name").unwrap_or_else(|| id.clone()),
            id,
            connector: text("connector"),
            description: text("description"),
        })
    }
}
