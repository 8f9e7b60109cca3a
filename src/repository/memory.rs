//! In-process source repository
//!
//! Holds source documents as JSON and applies patch operations through the
//! `json-patch` crate (RFC 6902). Every patch call is recorded, and
//! failures or latency can be injected to exercise the commit coordinator.

use async_trait::async_trait;
use rule_attach_types::{PatchOperation, Rule, SourceSummary};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Result, RuleCatalog, SourceRepository};
use crate::error::RepositoryError;

/// A recorded `patch_source` call
#[derive(Debug, Clone, PartialEq)]
pub struct PatchCall {
    pub source_id: String,
    pub operations: Vec<PatchOperation>,
}

#[derive(Default)]
pub struct InMemorySourceRepository {
    sources: RwLock<BTreeMap<String, Value>>,
    rules: Vec<Rule>,
    calls: Mutex<Vec<PatchCall>>,
    /// 1-based patch call number that fails
    fail_on_call: Mutex<Option<usize>>,
    patch_delay: Option<Duration>,
}

impl InMemorySourceRepository {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    /// Seed with source documents; each must carry a string `id`
    pub fn with_sources(rules: Vec<Rule>, sources: impl IntoIterator<Item = Value>) -> Self {
        let sources = sources
            .into_iter()
            .filter_map(|doc| {
                let id = doc.get("id")?.as_str()?.to_string();
                Some((id, doc))
            })
            .collect();
        Self {
            sources: RwLock::new(sources),
            ..Self::new(rules)
        }
    }

    /// Delay every patch call, to hold a commit in flight
    pub fn with_patch_delay(mut self, delay: Duration) -> Self {
        self.patch_delay = Some(delay);
        self
    }

    /// Make the n-th (1-based) patch call from now on fail
    pub fn fail_on_patch_call(&self, call: usize) {
        if let Ok(mut fail) = self.fail_on_call.lock() {
            *fail = Some(self.patch_calls().len() + call);
        }
    }

    pub async fn insert_source(&self, source: Value) -> Option<Value> {
        let id = source.get("id")?.as_str()?.to_string();
        self.sources.write().await.insert(id, source)
    }

    pub fn patch_calls(&self) -> Vec<PatchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: PatchCall) -> usize {
        match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(call);
                calls.len()
            }
            Err(_) => 0,
        }
    }

    fn should_fail(&self, call_number: usize) -> bool {
        self.fail_on_call
            .lock()
            .map(|fail| *fail == Some(call_number))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SourceRepository for InMemorySourceRepository {
    async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let sources = self.sources.read().await;
        Ok(sources.values().filter_map(SourceSummary::from_object).collect())
    }

    async fn get_source(&self, id: &str) -> Result<Value> {
        self.sources
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })
    }

    async fn patch_source(&self, id: &str, operations: &[PatchOperation]) -> Result<Value> {
        if let Some(delay) = self.patch_delay {
            tokio::time::sleep(delay).await;
        }
        let call_number = self.record(PatchCall {
            source_id: id.to_string(),
            operations: operations.to_vec(),
        });
        if self.should_fail(call_number) {
            return Err(RepositoryError::Status {
                status: 400,
                body: format!("injected failure on patch call {call_number}"),
            });
        }

        let mut sources = self.sources.write().await;
        let current = sources
            .get(id)
            .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })?;

        // all-or-nothing per call
        let mut patched = current.clone();
        apply_operations(&mut patched, operations)?;
        debug!("Applied {} operation(s) to {}", operations.len(), id);
        sources.insert(id.to_string(), patched.clone());
        Ok(patched)
    }
}

#[async_trait]
impl RuleCatalog for InMemorySourceRepository {
    async fn list_rules(&self) -> Result<Vec<Rule>> {
        Ok(self.rules.clone())
    }
}

/// Apply patch operations to a JSON document with RFC 6902 semantics.
///
/// Operations are applied in order; on error `doc` keeps the ones before the
/// failing operation, so callers wanting all-or-nothing pass a copy.
pub fn apply_operations(doc: &mut Value, operations: &[PatchOperation]) -> Result<()> {
    let patch: json_patch::Patch = serde_json::from_value(serde_json::to_value(operations)?)?;
    for (operation, step) in operations.iter().zip(&patch.0) {
        json_patch::patch(doc, std::slice::from_ref(step)).map_err(|e| {
            RepositoryError::PatchRejected {
                path: operation.path.clone(),
                reason: e.to_string(),
            }
        })?;
    }
    Ok(())
}
