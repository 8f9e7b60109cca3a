//! Pending Operation Queue
//!
//! Ordered patch operations that take the baseline to the live assignment
//! state. Each entry also remembers which slot it targets and what that slot
//! holds once the entry is applied, so an entry can be folded back into the
//! baseline after a partial commit and the queue can be replayed in tests.

use rule_attach_types::{PatchOperation, PatchVerb, Rule};
use std::collections::HashMap;

use crate::state::BaselineSnapshot;

/// One queued patch operation
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedOperation {
    pub slot_key: String,
    pub operation: PatchOperation,
    /// Slot contents after this operation is applied
    pub resulting: Vec<Rule>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingQueue {
    entries: Vec<QueuedOperation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueuedOperation] {
        &self.entries
    }

    /// Wire payload, in submission order
    pub fn operations(&self) -> Vec<PatchOperation> {
        self.entries.iter().map(|e| e.operation.clone()).collect()
    }

    pub(crate) fn push(&mut self, entry: QueuedOperation) {
        self.entries.push(entry);
    }

    pub(crate) fn remove(&mut self, index: usize) -> QueuedOperation {
        self.entries.remove(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut QueuedOperation> {
        self.entries.get_mut(index)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Latest entry at `path` matching `predicate`
    pub fn find_last(
        &self,
        path: &str,
        predicate: impl Fn(&QueuedOperation) -> bool,
    ) -> Option<usize> {
        self.entries
            .iter()
            .rposition(|e| e.operation.path == path && predicate(e))
    }

    /// The coalesced entry for a list slot, if any
    pub fn find_for_slot(&self, slot_key: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.slot_key == slot_key)
    }

    /// Drop the first `count` entries, folding their results into `baseline`
    pub(crate) fn absorb_applied(&mut self, count: usize, baseline: &mut BaselineSnapshot) {
        let count = count.min(self.entries.len());
        for entry in self.entries.drain(..count) {
            baseline.absorb(&entry.slot_key, entry.resulting);
        }
    }

    /// Replay the queue over `baseline`, returning the resulting slot contents
    /// for every slot the baseline or queue mentions.
    pub fn replay(&self, baseline: &BaselineSnapshot, slot_keys: &[&str]) -> HashMap<String, Vec<Rule>> {
        let mut slots: HashMap<String, Vec<Rule>> = slot_keys
            .iter()
            .map(|key| (key.to_string(), baseline.assigned(key).to_vec()))
            .collect();
        for entry in &self.entries {
            slots.insert(entry.slot_key.clone(), entry.resulting.clone());
        }
        slots
    }

    /// Count entries per verb; used for summaries
    pub fn verb_counts(&self) -> HashMap<PatchVerb, usize> {
        let mut counts = HashMap::new();
        for entry in &self.entries {
            *counts.entry(entry.operation.op).or_insert(0) += 1;
        }
        counts
    }
}
