//! Source repository traits: the sole boundary between the engine and the
//! source configuration API.
//!
//! [`http::HttpSourceRepository`] talks to the real API;
//! [`memory::InMemorySourceRepository`] keeps documents in process and is
//! used by tests and dry runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use rule_attach_types::{PatchOperation, Rule, SourceSummary};
use serde_json::Value;

use crate::error::RepositoryError;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<SourceSummary>>;

    /// Full source object as raw JSON
    async fn get_source(&self, id: &str) -> Result<Value>;

    /// Apply patch operations to a source, returning the updated object.
    /// The commit coordinator always sends exactly one operation per call.
    async fn patch_source(&self, id: &str, operations: &[PatchOperation]) -> Result<Value>;
}

/// Read-only catalog of assignable rules
#[async_trait]
pub trait RuleCatalog: Send + Sync {
    async fn list_rules(&self) -> Result<Vec<Rule>>;
}
