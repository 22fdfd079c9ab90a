//! Reconciliation pass tests against a recording in-memory server.

mod common;

use chrono::Utc;
use common::{create, without_keys, Call, CreateReply, MockRemote};
use ferry_engine::clock::FixedClock;
use ferry_engine::{
    Error, LocalStore, NewOp, OpKind, Outbox, PassOutcome, Reconciler, RemoteError,
    StaticConnectivity, SyncEvent, Task, TaskDraft, Violation,
};
use std::sync::Arc;

fn task(id: &str, title: &str) -> Task {
    Task::from_draft(id, TaskDraft::new(title), Utc::now())
}

fn online(remote: &Arc<MockRemote>) -> Reconciler {
    Reconciler::new(remote.clone(), Arc::new(StaticConnectivity(true)))
}

/// Queue an offline create the way `TaskClient` does.
fn queue_create(store: &mut LocalStore, id: &str, title: &str) {
    let task = task(id, title);
    store.cache.put(task.clone()).unwrap();
    store.outbox.enqueue(NewOp::create(task)).unwrap();
}

fn queue_update(store: &mut LocalStore, id: &str, title: &str) {
    let mut edited = store.cache.get(id).cloned().unwrap_or_else(|| task(id, title));
    edited.title = title.to_string();
    store.cache.put(edited.clone()).unwrap();
    store
        .outbox
        .enqueue(NewOp::update(id, None, edited))
        .unwrap();
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn phases_run_creates_then_updates_then_deletes() {
    let remote = Arc::new(MockRemote::new());
    remote.seed("srv-old", "Old");

    let mut store = LocalStore::in_memory();
    store.cache.put(task("srv-old", "Old")).unwrap();
    store
        .outbox
        .enqueue(NewOp::delete("srv-old", Some("srv-old".into())))
        .unwrap();
    queue_create(&mut store, "local-a", "A");
    queue_update(&mut store, "local-a", "A2");
    queue_create(&mut store, "local-b", "B");

    online(&remote).run(&mut store).await.unwrap();

    assert_eq!(
        without_keys(remote.calls()),
        vec![
            create("A"),
            create("B"),
            Call::Update {
                id: "srv-1".into(),
                title: "A2".into()
            },
            Call::Delete {
                id: "srv-old".into()
            },
        ]
    );
}

#[tokio::test]
async fn stalled_wall_clock_keeps_enqueue_order() {
    let remote = Arc::new(MockRemote::new());
    let mut store = LocalStore {
        outbox: Outbox::in_memory().with_wall_clock(Arc::new(FixedClock(1_000))),
        ..LocalStore::in_memory()
    };
    for title in ["A", "B", "C"] {
        queue_create(&mut store, &format!("local-{title}"), title);
    }

    let stamps: Vec<u64> = store.outbox.list_all().iter().map(|op| op.enqueued_at).collect();
    assert!(stamps.iter().all(|stamp| *stamp >= 1_000));

    online(&remote).run(&mut store).await.unwrap();

    let keys: Vec<String> = remote
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Create { key, .. } => Some(key),
            _ => None,
        })
        .collect();
    assert_eq!(keys, vec!["local-A", "local-B", "local-C"]);
}

// ============================================================================
// Identity mapping
// ============================================================================

#[tokio::test]
async fn create_maps_and_rekeys_the_cache() {
    let remote = Arc::new(MockRemote::new().with_create_replies([CreateReply::Id("42".into())]));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");

    let outcome = online(&remote).run(&mut store).await.unwrap();

    let PassOutcome::Completed(report) = outcome else {
        panic!("expected a completed pass, got {:?}", outcome);
    };
    assert_eq!(report.created, vec![("local-a".to_string(), "42".to_string())]);
    assert_eq!(store.identities.get("local-a").map(String::as_str), Some("42"));
    assert!(store.cache.get("local-a").is_none());
    assert_eq!(store.cache.get("42").unwrap().title, "A");
    assert!(store.outbox.is_empty());
}

#[tokio::test]
async fn create_sends_the_client_id_as_idempotency_key() {
    let remote = Arc::new(MockRemote::new());
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");

    online(&remote).run(&mut store).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![Call::Create {
            key: "local-a".into(),
            title: "A".into()
        }]
    );
}

#[tokio::test]
async fn update_of_server_known_task_uses_its_server_ref() {
    let remote = Arc::new(MockRemote::new());
    remote.seed("7", "Seven");

    let mut store = LocalStore::in_memory();
    let edited = task("7", "Seven, edited");
    store.cache.put(edited.clone()).unwrap();
    store
        .outbox
        .enqueue(NewOp::update("7", Some("7".into()), edited))
        .unwrap();

    online(&remote).run(&mut store).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![Call::Update {
            id: "7".into(),
            title: "Seven, edited".into()
        }]
    );
    assert_eq!(remote.server_task("7").unwrap()["title"], "Seven, edited");
    assert!(store.outbox.is_empty());
}

#[tokio::test]
async fn delete_after_create_in_same_pass_resolves_through_mapping() {
    let remote = Arc::new(MockRemote::new());
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");
    store.cache.remove("local-a").unwrap();
    store.outbox.enqueue(NewOp::delete("local-a", None)).unwrap();

    online(&remote).run(&mut store).await.unwrap();

    assert_eq!(
        without_keys(remote.calls()),
        vec![create("A"), Call::Delete { id: "srv-1".into() }]
    );
    assert_eq!(remote.server_len(), 0);
    assert!(store.cache.is_empty());
    assert!(store.outbox.is_empty());
}

// ============================================================================
// Fail-stop
// ============================================================================

#[tokio::test]
async fn first_failure_stops_the_pass() {
    let remote = Arc::new(MockRemote::new().failing_at(1));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");
    queue_create(&mut store, "local-b", "B");
    queue_create(&mut store, "local-c", "C");

    let err = online(&remote).run(&mut store).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Remote {
            kind: OpKind::Create,
            source: RemoteError::Status { status: 503, .. },
            ..
        }
    ));
    // C was never attempted
    assert_eq!(without_keys(remote.calls()), vec![create("A"), create("B")]);
    assert_eq!(store.outbox.len(), 2);
    assert!(store.outbox.has_pending_create("local-b"));
    assert!(store.outbox.has_pending_create("local-c"));
    assert_eq!(store.identities.len(), 1);
}

#[tokio::test]
async fn failed_create_blocks_later_phases() {
    let remote = Arc::new(MockRemote::new().failing_at(0));
    remote.seed("srv-old", "Old");

    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");
    store
        .outbox
        .enqueue(NewOp::delete("srv-old", Some("srv-old".into())))
        .unwrap();

    assert!(online(&remote).run(&mut store).await.is_err());

    assert_eq!(without_keys(remote.calls()), vec![create("A")]);
    assert_eq!(store.outbox.len(), 2);
    assert!(remote.server_task("srv-old").is_some());
}

#[tokio::test]
async fn failed_update_blocks_deletes_but_keeps_earlier_creates() {
    let remote = Arc::new(MockRemote::new().failing_at(1));
    remote.seed("srv-old", "Old");

    let mut store = LocalStore::in_memory();
    store.cache.put(task("srv-old", "Old")).unwrap();
    queue_create(&mut store, "local-a", "A");
    queue_update(&mut store, "local-a", "A2");
    store.cache.remove("srv-old").unwrap();
    store
        .outbox
        .enqueue(NewOp::delete("srv-old", Some("srv-old".into())))
        .unwrap();

    let err = online(&remote).run(&mut store).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Remote {
            kind: OpKind::Update,
            source: RemoteError::Status { status: 503, .. },
            ..
        }
    ));
    assert_eq!(
        without_keys(remote.calls()),
        vec![
            create("A"),
            Call::Update {
                id: "srv-1".into(),
                title: "A2".into()
            },
        ]
    );
    // The create stays applied; the update and the untried delete stay queued.
    assert_eq!(store.identities.get("local-a").map(String::as_str), Some("srv-1"));
    assert!(!store.outbox.has_pending_create("local-a"));
    let mut left = store.outbox.list_all();
    left.sort();
    let kinds: Vec<OpKind> = left.iter().map(|op| op.kind).collect();
    assert_eq!(kinds, vec![OpKind::Update, OpKind::Delete]);
    assert!(remote.server_task("srv-old").is_some());

    online(&remote).run(&mut store).await.unwrap();

    assert!(store.outbox.is_empty());
    assert_eq!(remote.server_task("srv-1").unwrap()["title"], "A2");
    assert!(remote.server_task("srv-old").is_none());
}

#[tokio::test]
async fn failed_delete_stops_the_delete_phase() {
    let remote = Arc::new(MockRemote::new().failing_at(0));
    remote.seed("srv-1", "One");
    remote.seed("srv-2", "Two");

    let mut store = LocalStore::in_memory();
    for id in ["srv-1", "srv-2"] {
        store
            .outbox
            .enqueue(NewOp::delete(id, Some(id.to_string())))
            .unwrap();
    }

    let err = online(&remote).run(&mut store).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Remote {
            kind: OpKind::Delete,
            ..
        }
    ));
    // srv-2 was never attempted
    assert_eq!(remote.calls(), vec![Call::Delete { id: "srv-1".into() }]);
    assert_eq!(store.outbox.len(), 2);
    assert_eq!(remote.server_len(), 2);

    online(&remote).run(&mut store).await.unwrap();

    assert!(store.outbox.is_empty());
    assert_eq!(remote.server_len(), 0);
}

#[tokio::test]
async fn aborted_pass_is_announced_with_remaining_count() {
    let remote = Arc::new(MockRemote::new().failing_at(0));
    let reconciler = online(&remote);
    let mut events = reconciler.events().subscribe();

    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");
    queue_create(&mut store, "local-b", "B");

    assert!(reconciler.run(&mut store).await.is_err());

    match events.recv().await.unwrap() {
        SyncEvent::Aborted { remaining, .. } => assert_eq!(remaining, 2),
        other => panic!("expected an abort event, got {:?}", other),
    }
}

#[tokio::test]
async fn retry_after_failure_drains_the_rest() {
    let remote = Arc::new(MockRemote::new().failing_at(0));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");

    let reconciler = online(&remote);
    assert!(reconciler.run(&mut store).await.is_err());
    assert!(reconciler.run(&mut store).await.is_ok());

    assert!(store.outbox.is_empty());
    assert_eq!(store.cache.get("srv-1").unwrap().title, "A");
}

// ============================================================================
// Orphans and empty passes
// ============================================================================

#[tokio::test]
async fn orphaned_operations_make_no_network_calls() {
    let remote = Arc::new(MockRemote::new());
    let mut store = LocalStore::in_memory();
    store
        .outbox
        .enqueue(NewOp::update("local-gone", None, task("local-gone", "X")))
        .unwrap();
    store.outbox.enqueue(NewOp::delete("local-gone", None)).unwrap();

    let outcome = online(&remote).run(&mut store).await.unwrap();

    assert!(remote.calls().is_empty());
    assert!(store.outbox.is_empty());
    let PassOutcome::Completed(report) = outcome else {
        panic!("expected a completed pass, got {:?}", outcome);
    };
    assert_eq!(report.discarded.len(), 2);
    assert_eq!(report.drained(), 2);
}

#[tokio::test]
async fn empty_pass_touches_nothing() {
    let remote = Arc::new(MockRemote::new());
    let mut store = LocalStore::in_memory();
    store.cache.put(task("9", "Nine")).unwrap();
    store.identities.set("local-9", "9").unwrap();

    let outcome = online(&remote).run(&mut store).await.unwrap();

    assert_eq!(outcome, PassOutcome::Idle);
    assert!(remote.calls().is_empty());
    assert_eq!(store.cache.len(), 1);
    assert_eq!(store.identities.len(), 1);
}

#[tokio::test]
async fn offline_pass_leaves_the_outbox_alone() {
    let remote = Arc::new(MockRemote::new());
    let reconciler = Reconciler::new(remote.clone(), Arc::new(StaticConnectivity(false)));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");

    assert_eq!(reconciler.run(&mut store).await.unwrap(), PassOutcome::Offline);
    assert!(remote.calls().is_empty());
    assert_eq!(store.outbox.len(), 1);
}

// ============================================================================
// Protocol violations
// ============================================================================

#[tokio::test]
async fn echoed_client_id_aborts_without_mapping() {
    let remote = Arc::new(MockRemote::new().with_create_replies([CreateReply::EchoClientId]));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");
    queue_create(&mut store, "local-b", "B");

    let err = online(&remote).run(&mut store).await.unwrap_err();

    assert_eq!(
        err,
        Error::ProtocolViolation {
            client_ref: "local-a".into(),
            reason: Violation::EchoedClientId,
        }
    );
    assert!(err.is_protocol_violation());
    assert!(store.identities.is_empty());
    assert_eq!(store.cache.get("local-a").unwrap().title, "A");
    assert_eq!(store.outbox.len(), 2);
    assert_eq!(remote.calls().len(), 1);
}

#[tokio::test]
async fn missing_server_id_aborts_without_mapping() {
    let remote = Arc::new(MockRemote::new().with_create_replies([CreateReply::MissingId]));
    let mut store = LocalStore::in_memory();
    queue_create(&mut store, "local-a", "A");

    let err = online(&remote).run(&mut store).await.unwrap_err();

    assert!(matches!(
        err,
        Error::ProtocolViolation {
            reason: Violation::MissingServerId,
            ..
        }
    ));
    assert!(store.identities.is_empty());
    assert!(store.outbox.has_pending_create("local-a"));
}

// ============================================================================
// Worked scenario
// ============================================================================

#[tokio::test]
async fn create_update_and_orphan_delete_scenario() {
    let remote = Arc::new(MockRemote::new().with_create_replies([CreateReply::Id("srv-9".into())]));
    let mut store = LocalStore {
        outbox: Outbox::in_memory().with_wall_clock(Arc::new(FixedClock(0))),
        ..LocalStore::in_memory()
    };

    // Delete of tmp-2 is the oldest record but still waits for the delete phase.
    store.outbox.enqueue(NewOp::delete("tmp-2", None)).unwrap();
    queue_create(&mut store, "tmp-1", "A");
    queue_update(&mut store, "tmp-1", "A2");

    let outcome = online(&remote).run(&mut store).await.unwrap();

    assert_eq!(
        remote.calls(),
        vec![
            Call::Create {
                key: "tmp-1".into(),
                title: "A".into()
            },
            Call::Update {
                id: "srv-9".into(),
                title: "A2".into()
            },
        ]
    );
    assert_eq!(store.identities.get("tmp-1").map(String::as_str), Some("srv-9"));
    assert_eq!(store.cache.get("srv-9").unwrap().title, "A2");
    assert!(store.cache.get("tmp-1").is_none());
    assert!(store.outbox.is_empty());

    let PassOutcome::Completed(report) = outcome else {
        panic!("expected a completed pass, got {:?}", outcome);
    };
    assert_eq!(report.created, vec![("tmp-1".to_string(), "srv-9".to_string())]);
    assert_eq!(report.updated, vec!["srv-9".to_string()]);
    assert_eq!(report.discarded.len(), 1);
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn state_survives_reopen_between_passes() {
    let dir = tempfile::tempdir().unwrap();
    let remote = Arc::new(MockRemote::new().failing_at(1));

    {
        let mut store = LocalStore::open(dir.path()).unwrap();
        queue_create(&mut store, "local-a", "A");
        queue_create(&mut store, "local-b", "B");
        assert!(online(&remote).run(&mut store).await.is_err());
    }

    let mut store = LocalStore::open(dir.path()).unwrap();
    assert_eq!(store.outbox.len(), 1);
    assert!(store.outbox.has_pending_create("local-b"));
    assert_eq!(store.identities.get("local-a").map(String::as_str), Some("srv-1"));
    assert_eq!(store.cache.get("srv-1").unwrap().title, "A");
    assert_eq!(store.cache.get("local-b").unwrap().title, "B");

    online(&remote).run(&mut store).await.unwrap();

    let reopened = LocalStore::open(dir.path()).unwrap();
    assert!(reopened.outbox.is_empty());
    assert_eq!(reopened.identities.len(), 2);
    assert!(reopened.cache.get("local-b").is_none());
    assert_eq!(reopened.cache.len(), 2);
}
