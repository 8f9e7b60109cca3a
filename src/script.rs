//! Move scripts
//!
//! A YAML list of drags replayed against a session, for planning changes
//! outside an interactive view:
//!
//! ```yaml
//! - rule: Map Users
//!   from: pool
//!   to: build-map-rule
//! - rule: 2c9180835d2e5168015d32f890ca1581
//!   from: native-rules
//!   to: pool
//! ```
//!
//! `rule` is a rule id or name. A refused step is recorded and the script
//! carries on with the next one.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::engine::{Location, MoveOutcome};
use crate::error::ScriptError;
use crate::session::RuleAttachSession;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedMove {
    pub rule: String,
    pub from: Location,
    pub to: Location,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoveScript {
    pub moves: Vec<ScriptedMove>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Accepted { outcome: MoveOutcome },
    Rejected { reason: String },
    UnknownRule,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// 1-based step number
    pub step: usize,
    #[serde(flatten)]
    pub scripted: ScriptedMove,
    #[serde(flatten)]
    pub status: StepStatus,
}

impl StepResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, StepStatus::Accepted { .. })
    }
}

impl MoveScript {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ScriptError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Run every move through `session`, in order
    pub fn apply(&self, session: &mut RuleAttachSession) -> Vec<StepResult> {
        self.moves
            .iter()
            .enumerate()
            .map(|(i, scripted)| {
                let status = match session.find_rule(&scripted.rule).cloned() {
                    None => {
                        warn!("Step {}: unknown rule '{}'", i + 1, scripted.rule);
                        StepStatus::UnknownRule
                    }
                    Some(rule) => match session.move_rule(&rule, &scripted.from, &scripted.to) {
                        Ok(outcome) => StepStatus::Accepted { outcome },
                        Err(err) => {
                            debug!("Step {} refused: {}", i + 1, err);
                            StepStatus::Rejected {
                                reason: err.to_string(),
                            }
                        }
                    },
                };
                StepResult {
                    step: i + 1,
                    scripted: scripted.clone(),
                    status,
                }
            })
            .collect()
    }
}
