//! Commit Coordinator
//!
//! Submits the pending queue one operation per request, in order, then
//! reloads the source and re-initializes the session from it.
//!
//! A failed operation stops the commit. Operations already accepted by the
//! server stay applied: they are folded into the session baseline and dropped
//! from the queue, so the remaining queue still describes the difference
//! between what the server holds and what the user sees.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::CommitError;
use crate::repository::SourceRepository;
use crate::session::RuleAttachSession;

/// Summary of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// Operations accepted by the server
    pub applied: usize,
    /// Whether the session was re-initialized from a fresh copy
    pub reloaded: bool,
}

pub struct CommitCoordinator {
    repository: Arc<dyn SourceRepository>,
    busy: AtomicBool,
}

/// Clears the busy flag on every exit path
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CommitCoordinator {
    pub fn new(repository: Arc<dyn SourceRepository>) -> Self {
        Self {
            repository,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, CommitError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CommitError::Busy)?;
        Ok(BusyGuard(&self.busy))
    }

    /// Submit the session's pending queue and resynchronize.
    pub async fn commit(
        &self,
        session: &mut RuleAttachSession,
    ) -> Result<CommitReport, CommitError> {
        let _guard = self.acquire()?;

        if !session.has_unsaved_changes() {
            return Ok(CommitReport {
                applied: 0,
                reloaded: false,
            });
        }

        let source_id = session.source_id().to_string();
        let operations = session.pending_operations();
        let total = operations.len();
        info!("Committing {} operation(s) to source {}", total, source_id);

        for (i, operation) in operations.into_iter().enumerate() {
            if let Err(source) = self
                .repository
                .patch_source(&source_id, std::slice::from_ref(&operation))
                .await
            {
                warn!(
                    "Operation {} of {} ({}) failed on source {}: {}",
                    i + 1,
                    total,
                    operation,
                    source_id,
                    source
                );
                session.absorb_applied(i);
                return Err(CommitError::PatchFailed {
                    position: i + 1,
                    total,
                    applied: i,
                    operation,
                    source,
                });
            }
        }

        let fresh = match self.repository.get_source(&source_id).await {
            Ok(fresh) => fresh,
            Err(source) => {
                warn!("Reload of source {} failed: {}", source_id, source);
                session.absorb_applied(total);
                return Err(CommitError::Reload {
                    applied: total,
                    source,
                });
            }
        };
        session.initialize(&fresh)?;

        info!("Committed {} operation(s) to source {}", total, source_id);
        Ok(CommitReport {
            applied: total,
            reloaded: true,
        })
    }
}
