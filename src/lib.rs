//! Rule Attach - undo-aware rule-slot reconciliation
//!
//! Operators arrange rules into the fixed slots of a source configuration by
//! dragging them between slots and an available pool. Every drag updates the
//! live assignment and keeps a pending patch queue equal to the minimal diff
//! from what was last persisted, so dragging a rule back where it came from
//! leaves nothing to save.
//!
//! Key concepts:
//! - Slots are static data ([`slots::SlotRegistry`]), loaded from YAML
//! - Baseline vs. assignment: what was loaded vs. what the operator sees
//! - The queue is committed one operation per request, then the source is
//!   reloaded and becomes the new baseline
//!
//! # Example
//!
//! ```no_run
//! use rule_attach::{Location, RuleAttachSession, SlotRegistry};
//! use rule_attach_types::Rule;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SlotRegistry::builtin()?);
//! let catalog = vec![Rule::new("r1", "Map Users", "BuildMap")];
//! let source = serde_json::json!({"id": "src-1", "connectorAttributes": {}});
//!
//! let mut session = RuleAttachSession::open(registry, catalog.clone(), &source)?;
//! session.move_rule(&catalog[0], &Location::Pool, &Location::slot("build-map-rule"))?;
//! assert_eq!(session.pending_len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod path;
pub mod queue;
pub mod repository;
pub mod script;
pub mod session;
pub mod slots;
pub mod state;

pub use commit::{CommitCoordinator, CommitReport};
pub use config::RuleAttachConfig;
pub use engine::{Location, MoveOutcome, QueueEffect, ReconciliationEngine};
pub use error::{
    CommitError, ConfigError, MoveError, RegistryError, RepositoryError, ScriptError, SessionError,
};
pub use queue::{PendingQueue, QueuedOperation};
pub use repository::{RuleCatalog, SourceRepository};
pub use script::{MoveScript, ScriptedMove, StepResult, StepStatus};
pub use session::{RuleAttachSession, SessionSnapshot, SessionWatcher, SlotView};
pub use slots::{Slot, SlotRegistry};
pub use state::{AssignmentState, BaselineSnapshot};
