//! Error handling for the rule-attach engine
//!
//! One `thiserror` enum per concern. [`MoveError`] is special: its `Display`
//! output is the user-facing text shown when a drag is refused.

use rule_attach_types::PatchOperation;
use thiserror::Error;

/// Slot registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Slot '{key}' is not registered")]
    UnknownSlot { key: String },

    #[error("Slot '{key}' is registered twice")]
    DuplicateSlot { key: String },

    #[error("Invalid definition for slot '{key}': {reason}")]
    InvalidSlot { key: String, reason: String },

    #[error("Failed to parse slot registry: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read slot registry '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A refused move. Nothing in the session changes when one of these is
/// returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("{rule} cannot be placed in {slot}: it accepts {allowed}")]
    TypeNotAllowed {
        rule: String,
        slot: String,
        allowed: String,
    },

    #[error("{slot} already holds {occupant}; remove it first")]
    SlotFull { slot: String, occupant: String },

    #[error("{slot} is not available on this source: no matching connection parameter")]
    NoParameterIndex { slot: String },

    #[error("{rule} is not assigned to {slot}")]
    NotInSlot { rule: String, slot: String },

    #[error("{rule} is not in the pool; it is assigned to {slot}")]
    NotInPool { rule: String, slot: String },

    #[error("{rule} is already assigned to {slot}")]
    AlreadyAssigned { rule: String, slot: String },

    #[error("Unknown slot '{key}'")]
    UnknownSlot { key: String },
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Source object has no string 'id' field")]
    MissingId,

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors from the external source configuration repository
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Source API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Source '{id}' not found")]
    NotFound { id: String },

    #[error("Patch rejected at '{path}': {reason}")]
    PatchRejected { path: String, reason: String },

    #[error("Invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Commit coordinator errors
#[derive(Error, Debug)]
pub enum CommitError {
    #[error("A commit is already in progress")]
    Busy,

    #[error(
        "Operation {position} of {total} ({operation}) failed after {applied} applied: {source}"
    )]
    PatchFailed {
        /// 1-based position of the failing operation
        position: usize,
        total: usize,
        applied: usize,
        operation: PatchOperation,
        #[source]
        source: RepositoryError,
    },

    #[error("All {applied} operations were applied but reloading the source failed: {source}")]
    Reload {
        applied: usize,
        #[source]
        source: RepositoryError,
    },

    #[error("Reloaded source could not be loaded: {0}")]
    Session(#[from] SessionError),
}

/// Move script loading errors
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid move script: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read move script {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages_are_user_facing() {
        let err = MoveError::TypeNotAllowed {
            rule: "Map Users".into(),
            slot: "Before Provisioning Rule".into(),
            allowed: "BeforeProvisioning".into(),
        };
        assert_eq!(
            err.to_string(),
            "Map Users cannot be placed in Before Provisioning Rule: it accepts BeforeProvisioning"
        );

        let err = MoveError::SlotFull {
            slot: "Build Map Rule".into(),
            occupant: "Map A".into(),
        };
        assert!(err.to_string().contains("already holds Map A"));
    }

    #[test]
    fn test_commit_error_names_failing_operation() {
        let err = CommitError::PatchFailed {
            position: 2,
            total: 3,
            applied: 1,
            operation: PatchOperation::remove("/accountCorrelationRule"),
            source: RepositoryError::Status {
                status: 400,
                body: "bad path".into(),
            },
        };
        let text = err.to_string();
        assert!(text.contains("Operation 2 of 3"));
        assert!(text.contains("remove /accountCorrelationRule"));
        assert!(text.contains("after 1 applied"));
    }
}
