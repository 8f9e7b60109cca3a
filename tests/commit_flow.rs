//! Integration tests for committing a session against the in-memory repository
//!
//! These tests verify that:
//! 1. Each queued operation is sent as its own patch, in order
//! 2. A successful commit reloads the source and clears the queue
//! 3. A failed patch leaves earlier operations applied and folded into the baseline
//! 4. A second commit on a busy coordinator is refused

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use rule_attach::repository::memory::InMemorySourceRepository;
use rule_attach::{
    CommitCoordinator, CommitError, CommitReport, Location, RepositoryError, RuleAttachSession,
    RuleCatalog, SlotRegistry, SourceRepository,
};
use rule_attach_types::{PatchOperation, PatchVerb, Rule, SourceSummary};

fn rules() -> Vec<Rule> {
    vec![
        Rule::new("bp-1", "BP One", "BeforeProvisioning"),
        Rule::new("bp-2", "BP Two", "BeforeProvisioning"),
        Rule::new("map-1", "Map One", "BuildMap"),
        Rule::new("nat-c", "Native Create", "ConnectorAfterCreate"),
        Rule::new("nat-d", "Native Delete", "ConnectorBeforeDelete"),
    ]
}

fn source() -> Value {
    json!({
        "id": "src-1",
        "name": "HR Directory",
        "connector": "web-services",
        "beforeProvisioningRule": {"type": "RULE", "id": "bp-1", "name": "BP One"},
        "connectorAttributes": {
            "nativeRules": ["Native Create", "Native Delete"]
        }
    })
}

async fn open(repo: &InMemorySourceRepository) -> RuleAttachSession {
    let registry = Arc::new(SlotRegistry::builtin().unwrap());
    let catalog = repo.list_rules().await.unwrap();
    let source = repo.get_source("src-1").await.unwrap();
    RuleAttachSession::open(registry, catalog, &source).unwrap()
}

fn drag(session: &mut RuleAttachSession, rule: &str, from: &str, to: &str) {
    let rule = session.find_rule(rule).cloned().unwrap();
    session
        .move_rule(&rule, &Location::from(from), &Location::from(to))
        .unwrap();
}

/// Four operations: remove + add on the before-provisioning slot, an add on
/// the build map slot and a replace of the native rule list.
fn arrange(session: &mut RuleAttachSession) {
    drag(session, "bp-1", "before-provisioning-rule", "pool");
    drag(session, "bp-2", "pool", "before-provisioning-rule");
    drag(session, "map-1", "pool", "build-map-rule");
    drag(session, "nat-d", "native-rules", "pool");
    assert_eq!(session.pending_len(), 4);
}

fn assert_replay_matches(session: &RuleAttachSession) {
    let keys: Vec<&str> = session.registry().keys().collect();
    let replayed = session.queue().replay(session.baseline(), &keys);
    assert!(session.assignment().matches(&replayed));
}

#[tokio::test]
async fn test_commit_sends_one_patch_per_operation_and_reloads() {
    let repo = Arc::new(InMemorySourceRepository::with_sources(rules(), vec![source()]));
    let mut session = open(&repo).await;
    arrange(&mut session);
    let expected = session.pending_operations();
    let mut watcher = session.subscribe();

    let coordinator = CommitCoordinator::new(repo.clone());
    let report = coordinator.commit(&mut session).await.unwrap();
    assert_eq!(
        report,
        CommitReport {
            applied: 4,
            reloaded: true
        }
    );

    let calls = repo.patch_calls();
    assert_eq!(calls.len(), 4);
    for (call, operation) in calls.iter().zip(&expected) {
        assert_eq!(call.source_id, "src-1");
        assert_eq!(call.operations, vec![operation.clone()]);
    }
    assert_eq!(calls[0].operations[0].op, PatchVerb::Remove);

    let stored = repo.get_source("src-1").await.unwrap();
    assert_eq!(
        stored["beforeProvisioningRule"],
        json!({"type": "RULE", "id": "bp-2", "name": "BP Two"})
    );
    assert_eq!(stored["connectorAttributes"]["buildMapRule"], json!("Map One"));
    assert_eq!(stored["connectorAttributes"]["nativeRules"], json!(["Native Create"]));

    assert!(!session.has_unsaved_changes());
    assert!(session.is_originally_assigned("before-provisioning-rule", "bp-2"));
    assert!(session.is_originally_assigned("build-map-rule", "map-1"));

    let snapshot = watcher.borrow_and_update().clone();
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.source_name, "HR Directory");
    let pool: Vec<_> = snapshot.pool.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(pool, vec!["bp-1", "nat-d"]);
}

#[tokio::test]
async fn test_partial_failure_keeps_applied_operations() {
    let repo = Arc::new(InMemorySourceRepository::with_sources(rules(), vec![source()]));
    let mut session = open(&repo).await;
    arrange(&mut session);
    repo.fail_on_patch_call(3);

    let coordinator = CommitCoordinator::new(repo.clone());
    let err = coordinator.commit(&mut session).await.unwrap_err();
    match &err {
        CommitError::PatchFailed {
            position,
            total,
            applied,
            operation,
            ..
        } => {
            assert_eq!((*position, *total, *applied), (3, 4, 2));
            assert_eq!(operation.path, "/connectorAttributes/buildMapRule");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().starts_with("Operation 3 of 4"));
    assert!(!coordinator.is_busy());

    // the first two operations are on the server and now part of the baseline
    let stored = repo.get_source("src-1").await.unwrap();
    assert_eq!(stored["beforeProvisioningRule"]["id"], json!("bp-2"));
    assert!(stored["connectorAttributes"].get("buildMapRule").is_none());
    assert!(session.is_originally_assigned("before-provisioning-rule", "bp-2"));
    assert_eq!(session.pending_len(), 2);
    assert_replay_matches(&session);

    // dragging bp-2 out now queues a remove rather than cancelling an add
    let bp2 = session.find_rule("bp-2").cloned().unwrap();
    let outcome = session
        .move_rule(&bp2, &Location::slot("before-provisioning-rule"), &Location::Pool)
        .unwrap();
    assert_eq!(outcome.pending, 3);
    drag(&mut session, "bp-2", "pool", "before-provisioning-rule");
    assert_eq!(session.pending_len(), 2);

    let report = coordinator.commit(&mut session).await.unwrap();
    assert_eq!(report.applied, 2);
    let stored = repo.get_source("src-1").await.unwrap();
    assert_eq!(stored["connectorAttributes"]["buildMapRule"], json!("Map One"));
    assert_eq!(stored["connectorAttributes"]["nativeRules"], json!(["Native Create"]));
    assert_eq!(repo.patch_calls().len(), 5);
}

#[tokio::test]
async fn test_concurrent_commit_is_refused() {
    let repo = Arc::new(
        InMemorySourceRepository::with_sources(rules(), vec![source()])
            .with_patch_delay(Duration::from_millis(20)),
    );
    let mut first = open(&repo).await;
    let mut second = open(&repo).await;
    drag(&mut first, "map-1", "pool", "build-map-rule");
    drag(&mut second, "nat-d", "native-rules", "pool");

    let coordinator = CommitCoordinator::new(repo.clone());
    let (a, b) = tokio::join!(coordinator.commit(&mut first), coordinator.commit(&mut second));

    let (committed, refused) = match (a, b) {
        (Ok(report), Err(CommitError::Busy)) => (report, &second),
        (Err(CommitError::Busy), Ok(report)) => (report, &first),
        other => panic!("expected exactly one busy refusal, got {other:?}"),
    };
    assert_eq!(committed.applied, 1);
    assert!(refused.has_unsaved_changes());
    assert!(!coordinator.is_busy());
    assert_eq!(repo.patch_calls().len(), 1);
}

#[tokio::test]
async fn test_empty_queue_is_a_no_op() {
    let repo = Arc::new(InMemorySourceRepository::with_sources(rules(), vec![source()]));
    let mut session = open(&repo).await;
    drag(&mut session, "map-1", "pool", "build-map-rule");
    drag(&mut session, "map-1", "build-map-rule", "pool");

    let report = CommitCoordinator::new(repo.clone())
        .commit(&mut session)
        .await
        .unwrap();
    assert_eq!(report.applied, 0);
    assert!(!report.reloaded);
    assert!(repo.patch_calls().is_empty());
}

/// Accepts patches but fails every read once a patch has been applied
struct ReloadFails {
    inner: InMemorySourceRepository,
}

#[async_trait]
impl SourceRepository for ReloadFails {
    async fn list_sources(&self) -> Result<Vec<SourceSummary>, RepositoryError> {
        self.inner.list_sources().await
    }

    async fn get_source(&self, id: &str) -> Result<Value, RepositoryError> {
        if self.inner.patch_calls().is_empty() {
            return self.inner.get_source(id).await;
        }
        Err(RepositoryError::Status {
            status: 503,
            body: "unavailable".into(),
        })
    }

    async fn patch_source(
        &self,
        id: &str,
        operations: &[PatchOperation],
    ) -> Result<Value, RepositoryError> {
        self.inner.patch_source(id, operations).await
    }
}

#[tokio::test]
async fn test_reload_failure_absorbs_the_whole_queue() {
    let repo = Arc::new(ReloadFails {
        inner: InMemorySourceRepository::with_sources(rules(), vec![source()]),
    });
    let registry = Arc::new(SlotRegistry::builtin().unwrap());
    let mut session =
        RuleAttachSession::open(registry, rules(), &repo.get_source("src-1").await.unwrap())
            .unwrap();
    arrange(&mut session);

    let err = CommitCoordinator::new(repo.clone())
        .commit(&mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Reload { applied: 4, .. }));
    assert!(!session.has_unsaved_changes());
    assert!(session.is_originally_assigned("build-map-rule", "map-1"));
    assert_replay_matches(&session);
}
