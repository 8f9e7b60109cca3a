//! Rule attach session
//!
//! Owns everything loaded for one source: the baseline, the live assignment,
//! the pending queue and the derived parameter indices. The UI sends moves in
//! and renders from [`SessionSnapshot`]s, either pulled with
//! [`RuleAttachSession::snapshot`] or pushed through a watch channel.

use chrono::{DateTime, Utc};
use rule_attach_types::{PatchOperation, Rule};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::engine::{Location, MoveOutcome, ReconciliationEngine};
use crate::error::{MoveError, SessionError};
use crate::path::ParamIndexMap;
use crate::queue::{PendingQueue, QueuedOperation};
use crate::slots::{Cardinality, SlotRegistry};
use crate::state::{self, AssignmentState, BaselineSnapshot};

/// One slot as the view renders it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotView {
    pub key: String,
    pub label: String,
    pub cardinality: Cardinality,
    pub rules: Vec<Rule>,
    /// False for scoped slots with no matching connection parameter
    pub available: bool,
}

/// Snapshot published after every load and accepted move
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub source_id: String,
    pub source_name: String,
    /// Incremented on each publish
    pub version: u64,
    pub slots: Vec<SlotView>,
    /// Catalog rules not assigned to any slot
    pub pool: Vec<Rule>,
    /// Pending queue length ("unsaved changes")
    pub pending: usize,
    pub updated_at: DateTime<Utc>,
}

/// Receiver that yields a new snapshot on every session update
pub type SessionWatcher = watch::Receiver<SessionSnapshot>;

pub struct RuleAttachSession {
    registry: Arc<SlotRegistry>,
    catalog: Vec<Rule>,
    source_id: String,
    source_name: String,
    indices: ParamIndexMap,
    baseline: BaselineSnapshot,
    assignment: AssignmentState,
    queue: PendingQueue,
    version: u64,
    sender: watch::Sender<SessionSnapshot>,
}

impl RuleAttachSession {
    /// Open a session on a freshly loaded source object
    pub fn open(
        registry: Arc<SlotRegistry>,
        catalog: Vec<Rule>,
        source: &Value,
    ) -> Result<Self, SessionError> {
        let (sender, _rx) = watch::channel(SessionSnapshot {
            source_id: String::new(),
            source_name: String::new(),
            version: 0,
            slots: Vec::new(),
            pool: Vec::new(),
            pending: 0,
            updated_at: Utc::now(),
        });
        let mut session = Self {
            registry,
            catalog,
            source_id: String::new(),
            source_name: String::new(),
            indices: ParamIndexMap::default(),
            baseline: BaselineSnapshot::default(),
            assignment: AssignmentState::default(),
            queue: PendingQueue::new(),
            version: 0,
            sender,
        };
        session.initialize(source)?;
        Ok(session)
    }

    /// Load (or reload) a source object.
    ///
    /// Baseline and assignment are rebuilt from `source`, parameter indices
    /// re-derived and the pending queue discarded.
    pub fn initialize(&mut self, source: &Value) -> Result<(), SessionError> {
        let id = source
            .get("id")
            .and_then(Value::as_str)
            .ok_or(SessionError::MissingId)?;
        self.source_id = id.to_string();
        self.source_name = source
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();

        self.indices = ParamIndexMap::derive(&self.registry, source);
        let (baseline, assignment) =
            state::initialize(&self.registry, &self.catalog, &self.indices, source);
        self.baseline = baseline;
        self.assignment = assignment;
        self.queue.clear();

        info!(
            "Loaded source {} ({}) with {} assigned slots",
            self.source_name,
            self.source_id,
            self.registry
                .all_slots()
                .iter()
                .filter(|s| !self.assignment.currently_assigned(&s.key).is_empty())
                .count()
        );
        self.publish();
        Ok(())
    }

    /// Apply one drag. Refused moves change nothing.
    pub fn move_rule(
        &mut self,
        rule: &Rule,
        from: &Location,
        to: &Location,
    ) -> Result<MoveOutcome, MoveError> {
        let engine = ReconciliationEngine::new(&self.registry, &self.baseline, &self.indices);
        let outcome = engine.move_rule(&mut self.assignment, &mut self.queue, rule, from, to)?;
        if outcome.left.is_some() || outcome.entered.is_some() {
            self.publish();
        }
        Ok(outcome)
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub fn catalog(&self) -> &[Rule] {
        &self.catalog
    }

    /// Find a catalog rule by id, falling back to an exact name match
    pub fn find_rule(&self, needle: &str) -> Option<&Rule> {
        self.catalog
            .iter()
            .find(|r| r.id == needle)
            .or_else(|| self.catalog.iter().find(|r| r.name == needle))
            .or_else(|| {
                self.registry.all_slots().iter().find_map(|slot| {
                    self.assignment
                        .currently_assigned(&slot.key)
                        .iter()
                        .find(|r| r.id == needle || r.name == needle)
                })
            })
    }

    pub fn currently_assigned(&self, slot_key: &str) -> &[Rule] {
        self.assignment.currently_assigned(slot_key)
    }

    pub fn is_originally_assigned(&self, slot_key: &str, rule_id: &str) -> bool {
        self.baseline.is_originally_assigned(slot_key, rule_id)
    }

    pub fn baseline(&self) -> &BaselineSnapshot {
        &self.baseline
    }

    pub fn assignment(&self) -> &AssignmentState {
        &self.assignment
    }

    pub fn pending(&self) -> &[QueuedOperation] {
        self.queue.entries()
    }

    pub fn pending_operations(&self) -> Vec<PatchOperation> {
        self.queue.operations()
    }

    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    /// Catalog rules not currently assigned anywhere
    pub fn pool(&self) -> Vec<Rule> {
        self.catalog
            .iter()
            .filter(|r| !self.assignment.is_assigned_anywhere(&r.id))
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let slots = self
            .registry
            .all_slots()
            .iter()
            .map(|slot| SlotView {
                key: slot.key.clone(),
                label: slot.label.clone(),
                cardinality: slot.cardinality,
                rules: self.assignment.currently_assigned(&slot.key).to_vec(),
                available: !slot.is_scoped() || self.indices.get(&slot.key).is_some(),
            })
            .collect();
        SessionSnapshot {
            source_id: self.source_id.clone(),
            source_name: self.source_name.clone(),
            version: self.version,
            slots,
            pool: self.pool(),
            pending: self.queue.len(),
            updated_at: Utc::now(),
        }
    }

    /// Subscribe to snapshots; the receiver starts at the current state
    pub fn subscribe(&self) -> SessionWatcher {
        self.sender.subscribe()
    }

    /// Fold the first `count` queue entries into the baseline after they were
    /// applied remotely
    pub(crate) fn absorb_applied(&mut self, count: usize) {
        self.queue.absorb_applied(count, &mut self.baseline);
        self.publish();
    }

    fn publish(&mut self) {
        self.version += 1;
        let snapshot = self.snapshot();
        self.sender.send_replace(snapshot);
    }
}
