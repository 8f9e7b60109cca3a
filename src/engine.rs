//! Reconciliation Engine
//!
//! Applies one drag (`rule` from one location to another) to the assignment
//! state and keeps the pending queue equal to the minimal diff between the
//! baseline and the live state.
//!
//! ## Undo awareness
//!
//! The pivot is [`BaselineSnapshot::is_originally_assigned`]:
//!
//! - A rule leaving a slot it was *not* originally in had its `add`/`replace`
//!   queued earlier this session; that entry is dropped instead of queueing a
//!   `remove`.
//! - A rule entering a slot it *was* originally in had its `remove` queued
//!   earlier; that entry is dropped instead of queueing an `add`.
//!
//! List slots keep a single coalesced entry holding the full current list,
//! which is dropped whenever the list matches the baseline again.
//!
//! Every move is validated in full before anything is mutated, so a refused
//! move leaves the state and the queue untouched.

use rule_attach_types::{PatchOperation, PatchVerb, Rule};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MoveError;
use crate::path::{resolve_in, ParamIndexMap};
use crate::queue::{PendingQueue, QueuedOperation};
use crate::slots::{Slot, SlotRegistry};
use crate::state::{AssignmentState, BaselineSnapshot};

/// Keyword used for the available pool in scripts and on the command line
pub const POOL: &str = "pool";

/// Where a rule is dragged from or to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Location {
    /// The unconstrained pool of available rules
    Pool,
    Slot(String),
}

impl Location {
    pub fn slot(key: impl Into<String>) -> Self {
        Location::Slot(key.into())
    }

    pub fn slot_key(&self) -> Option<&str> {
        match self {
            Location::Pool => None,
            Location::Slot(key) => Some(key.as_str()),
        }
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        if value.is_empty() || value.eq_ignore_ascii_case(POOL) {
            Location::Pool
        } else {
            Location::Slot(value)
        }
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Location::from(value.to_string())
    }
}

impl From<Location> for String {
    fn from(value: Location) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Pool => f.write_str(POOL),
            Location::Slot(key) => f.write_str(key),
        }
    }
}

/// What one side of a move did to the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", content = "op", rename_all = "snake_case")]
pub enum QueueEffect {
    /// A new entry was appended
    Enqueued(PatchVerb),
    /// An earlier entry was dropped (undo)
    Cancelled(PatchVerb),
    /// A list slot's entry was rewritten in place
    Coalesced,
    /// No queue change
    Unchanged,
}

/// Result of an accepted move
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub left: Option<QueueEffect>,
    pub entered: Option<QueueEffect>,
    /// Queue length after the move
    pub pending: usize,
}

/// A validated slot endpoint: the slot and its resolved path
struct Endpoint<'r> {
    slot: &'r Slot,
    path: String,
}

/// Borrowed view over everything a move reads
pub struct ReconciliationEngine<'a> {
    registry: &'a SlotRegistry,
    baseline: &'a BaselineSnapshot,
    indices: &'a ParamIndexMap,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(
        registry: &'a SlotRegistry,
        baseline: &'a BaselineSnapshot,
        indices: &'a ParamIndexMap,
    ) -> Self {
        Self {
            registry,
            baseline,
            indices,
        }
    }

    /// Move `rule` from `from` to `to`.
    pub fn move_rule(
        &self,
        assignment: &mut AssignmentState,
        queue: &mut PendingQueue,
        rule: &Rule,
        from: &Location,
        to: &Location,
    ) -> Result<MoveOutcome, MoveError> {
        if from == to {
            return Ok(MoveOutcome {
                left: None,
                entered: None,
                pending: queue.len(),
            });
        }

        let leaving = match from {
            Location::Slot(key) => Some(self.check_leave(assignment, rule, key)?),
            Location::Pool => {
                self.check_in_pool(assignment, rule)?;
                None
            }
        };
        let entering = match to {
            Location::Slot(key) => Some(self.check_enter(assignment, rule, key)?),
            Location::Pool => None,
        };

        let left = leaving.map(|end| self.leave(assignment, queue, &end, rule));
        let entered = entering.map(|end| self.enter(assignment, queue, &end, rule));

        debug!(
            "Moved {} from {} to {}: left={:?} entered={:?} pending={}",
            rule.name,
            from,
            to,
            left,
            entered,
            queue.len()
        );

        Ok(MoveOutcome {
            left,
            entered,
            pending: queue.len(),
        })
    }

    fn lookup(&self, key: &str) -> Result<&'a Slot, MoveError> {
        self.registry
            .lookup(key)
            .map_err(|_| MoveError::UnknownSlot {
                key: key.to_string(),
            })
    }

    fn check_leave(
        &self,
        assignment: &AssignmentState,
        rule: &Rule,
        key: &str,
    ) -> Result<Endpoint<'a>, MoveError> {
        let slot = self.lookup(key)?;
        if !assignment.contains(&slot.key, &rule.id) {
            return Err(MoveError::NotInSlot {
                rule: rule.name.clone(),
                slot: slot.label.clone(),
            });
        }
        let path = resolve_in(slot, self.indices).ok_or_else(|| MoveError::NoParameterIndex {
            slot: slot.label.clone(),
        })?;
        Ok(Endpoint { slot, path })
    }

    /// A rule leaving the pool must not already sit in a slot
    fn check_in_pool(&self, assignment: &AssignmentState, rule: &Rule) -> Result<(), MoveError> {
        match self
            .registry
            .all_slots()
            .iter()
            .find(|slot| assignment.contains(&slot.key, &rule.id))
        {
            Some(slot) => Err(MoveError::NotInPool {
                rule: rule.name.clone(),
                slot: slot.label.clone(),
            }),
            None => Ok(()),
        }
    }

    fn check_enter(
        &self,
        assignment: &AssignmentState,
        rule: &Rule,
        key: &str,
    ) -> Result<Endpoint<'a>, MoveError> {
        let slot = self.lookup(key)?;
        if !slot.accepts(&rule.rule_type) {
            return Err(MoveError::TypeNotAllowed {
                rule: rule.name.clone(),
                slot: slot.label.clone(),
                allowed: slot.allowed_display(),
            });
        }
        if assignment.contains(&slot.key, &rule.id) {
            return Err(MoveError::AlreadyAssigned {
                rule: rule.name.clone(),
                slot: slot.label.clone(),
            });
        }
        if !slot.is_multi() {
            if let Some(occupant) = assignment.currently_assigned(&slot.key).first() {
                return Err(MoveError::SlotFull {
                    slot: slot.label.clone(),
                    occupant: occupant.name.clone(),
                });
            }
        }
        let path = resolve_in(slot, self.indices).ok_or_else(|| MoveError::NoParameterIndex {
            slot: slot.label.clone(),
        })?;
        Ok(Endpoint { slot, path })
    }

    fn leave(
        &self,
        assignment: &mut AssignmentState,
        queue: &mut PendingQueue,
        end: &Endpoint<'_>,
        rule: &Rule,
    ) -> QueueEffect {
        let slot = end.slot;
        let was_original = self.baseline.is_originally_assigned(&slot.key, &rule.id);
        assignment.remove(&slot.key, &rule.id);

        if slot.is_multi() {
            return self.sync_list(assignment, queue, end);
        }

        let pending = queue.find_last(&end.path, |e| {
            matches!(e.operation.op, PatchVerb::Add | PatchVerb::Replace)
                && e.operation
                    .value
                    .as_ref()
                    .is_some_and(|v| slot.value_denotes(v, rule))
        });
        if let (false, Some(index)) = (was_original, pending) {
            let undone = queue.remove(index);
            return QueueEffect::Cancelled(undone.operation.op);
        }

        queue.push(QueuedOperation {
            slot_key: slot.key.clone(),
            operation: PatchOperation::remove(end.path.clone()),
            resulting: assignment.currently_assigned(&slot.key).to_vec(),
        });
        QueueEffect::Enqueued(PatchVerb::Remove)
    }

    fn enter(
        &self,
        assignment: &mut AssignmentState,
        queue: &mut PendingQueue,
        end: &Endpoint<'_>,
        rule: &Rule,
    ) -> QueueEffect {
        let slot = end.slot;
        let was_original = self.baseline.is_originally_assigned(&slot.key, &rule.id);

        if slot.is_multi() {
            let index = self.insertion_index(assignment, &slot.key, rule);
            assignment.insert(&slot.key, index, rule.clone());
            return self.sync_list(assignment, queue, end);
        }

        let occupied = !assignment.currently_assigned(&slot.key).is_empty();
        assignment.push(&slot.key, rule.clone());

        let pending = queue.find_last(&end.path, |e| e.operation.op == PatchVerb::Remove);
        if let (true, Some(index)) = (was_original, pending) {
            let undone = queue.remove(index);
            return QueueEffect::Cancelled(undone.operation.op);
        }

        let value = slot.single_value(rule);
        let operation = if occupied {
            PatchOperation::replace(end.path.clone(), value)
        } else {
            PatchOperation::add(end.path.clone(), value)
        };
        let verb = operation.op;
        queue.push(QueuedOperation {
            slot_key: slot.key.clone(),
            operation,
            resulting: assignment.currently_assigned(&slot.key).to_vec(),
        });
        QueueEffect::Enqueued(verb)
    }

    /// Originally-assigned rules go back to their baseline position; others
    /// are appended.
    fn insertion_index(&self, assignment: &AssignmentState, slot_key: &str, rule: &Rule) -> usize {
        let current = assignment.currently_assigned(slot_key);
        match self.baseline.position(slot_key, &rule.id) {
            Some(home) => current
                .iter()
                .position(|r| {
                    self.baseline
                        .position(slot_key, &r.id)
                        .map_or(true, |other| other > home)
                })
                .unwrap_or(current.len()),
            None => current.len(),
        }
    }

    /// Bring a list slot's single coalesced entry in line with its contents
    fn sync_list(
        &self,
        assignment: &AssignmentState,
        queue: &mut PendingQueue,
        end: &Endpoint<'_>,
    ) -> QueueEffect {
        let slot = end.slot;
        let current = assignment.currently_assigned(&slot.key);
        let baseline = self.baseline.assigned(&slot.key);
        let existing = queue.find_for_slot(&slot.key);

        if current == baseline {
            return match existing {
                Some(index) => QueueEffect::Cancelled(queue.remove(index).operation.op),
                None => QueueEffect::Unchanged,
            };
        }

        let value = slot.list_value(current);
        let operation = if baseline.is_empty() {
            PatchOperation::add(end.path.clone(), value)
        } else {
            PatchOperation::replace(end.path.clone(), value)
        };

        match existing.and_then(|index| queue.get_mut(index)) {
            Some(entry) => {
                entry.operation = operation;
                entry.resulting = current.to_vec();
                QueueEffect::Coalesced
            }
            None => {
                let verb = operation.op;
                queue.push(QueuedOperation {
                    slot_key: slot.key.clone(),
                    operation,
                    resulting: current.to_vec(),
                });
                QueueEffect::Enqueued(verb)
            }
        }
    }
}
