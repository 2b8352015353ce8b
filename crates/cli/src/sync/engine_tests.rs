// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the sync engine.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use super::*;
use crate::test_helpers::{fast_policy, Harness};
use fl_core::{FileQueue, MutationDraft};
use serde_json::json;
use tempfile::tempdir;

fn engine_for(h: &Harness, policy: BackoffPolicy) -> SyncEngine {
    SyncEngine::new(
        h.store(),
        Arc::clone(&h.cache),
        h.gateway(),
        Arc::clone(&h.monitor),
        policy,
    )
}

fn completed(report: DrainReport) -> DrainSummary {
    match report {
        DrainReport::Completed(summary) => summary,
        DrainReport::Coalesced => panic!("expected a completed drain"),
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

#[tokio::test]
async fn drains_in_enqueue_order() {
    let h = Harness::online();
    let a = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let b = h.store.append(MutationDraft::create("training/b", json!({"sets": 2}))).unwrap();
    let c = h.store.append(MutationDraft::delete("training/old")).unwrap();
    let engine = engine_for(&h, fast_policy(3));

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.applied, vec![a, b, c]);
    assert_eq!(summary.stop, StopReason::Drained);
    assert!(summary.error().is_none());
    assert_eq!(
        h.gateway.applied_targets(),
        vec!["training/a", "training/b", "training/old"]
    );
    assert!(h.store.is_empty().unwrap());
    assert_eq!(engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn offline_create_then_update_replays_in_order() {
    let h = Harness::offline();
    h.store
        .append(MutationDraft::create("training/2024-06-01", json!({"sets": 3})))
        .unwrap();
    h.store
        .append(MutationDraft::update("training/2024-06-01", json!({"sets": 4})))
        .unwrap();
    h.gateway.script([
        Outcome::Success(json!({"id": "2024-06-01", "sets": 3})),
        Outcome::Success(json!({"id": "2024-06-01", "sets": 4})),
    ]);
    let engine = engine_for(&h, fast_policy(3));

    // Nothing moves while unreachable
    let summary = completed(engine.trigger().await.unwrap());
    assert_eq!(summary.stop, StopReason::Unreachable);
    assert_eq!(h.gateway.apply_calls(), 0);
    assert_eq!(h.store.len().unwrap(), 2);

    h.monitor.report_probe(true);
    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.applied.len(), 2);
    let kinds: Vec<MutationKind> = h.gateway.applied().iter().map(|op| op.kind).collect();
    assert_eq!(kinds, vec![MutationKind::Create, MutationKind::Update]);
    assert_eq!(
        h.cache.get("training/2024-06-01").unwrap().unwrap().value,
        json!({"id": "2024-06-01", "sets": 4})
    );
}

#[tokio::test]
async fn empty_response_caches_payload() {
    let h = Harness::online();
    h.store
        .append(MutationDraft::update("user/1", json!({"weight": 80})))
        .unwrap();
    let engine = engine_for(&h, fast_policy(3));

    engine.trigger().await.unwrap();

    assert_eq!(
        h.cache.get("user/1").unwrap().unwrap().value,
        json!({"weight": 80})
    );
}

#[tokio::test]
async fn delete_drops_cached_value() {
    let h = Harness::online();
    h.cache.put("training/a", &json!({"sets": 1})).unwrap();
    h.store.append(MutationDraft::delete("training/a")).unwrap();
    let engine = engine_for(&h, fast_policy(3));

    engine.trigger().await.unwrap();

    assert!(h.cache.get("training/a").unwrap().is_none());
}

#[tokio::test]
async fn transient_failure_retries_then_succeeds() {
    let h = Harness::online();
    let id = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.gateway.script([
        Outcome::RemoteFailure(503),
        Outcome::ConnectivityFailure,
        Outcome::Success(Value::Null),
    ]);
    let engine = engine_for(&h, fast_policy(5));
    let mut events = engine.subscribe_events();

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.applied, vec![id.clone()]);
    assert_eq!(h.gateway.apply_calls(), 3);

    let mut retries = Vec::new();
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::RetryScheduled { attempt, .. } => retries.push(attempt),
            SyncEvent::StateChanged(state) => states.push(state),
            _ => {}
        }
    }
    assert_eq!(retries, vec![1, 2]);
    assert_eq!(
        states,
        vec![
            SyncState::Draining,
            SyncState::BackingOff,
            SyncState::Draining,
            SyncState::BackingOff,
            SyncState::Draining,
            SyncState::Idle,
        ]
    );
}

#[tokio::test]
async fn exhausted_head_halts_and_keeps_rest() {
    let h = Harness::online();
    let head = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let tail = h.store.append(MutationDraft::create("training/b", json!({"sets": 2}))).unwrap();
    h.gateway.set_default_apply(Outcome::RemoteFailure(500));
    let engine = engine_for(&h, fast_policy(3));

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(
        summary.stop,
        StopReason::Exhausted {
            id: head.clone(),
            attempts: 3
        }
    );
    assert!(matches!(
        summary.error(),
        Some(Error::ExhaustedRetry { ref id, attempts: 3 }) if *id == head
    ));
    // Only the head was ever attempted
    assert_eq!(h.gateway.applied_targets(), vec!["training/a"; 3]);

    let ops = h.store.list().unwrap();
    assert_eq!(ops.len(), 2);
    assert_eq!(ops[0].id, head);
    assert_eq!(ops[0].failure.as_ref().map(|f| f.attempts), Some(3));
    assert_eq!(ops[1].id, tail);
    assert!(!ops[1].is_failed());
}

#[tokio::test]
async fn failed_head_blocks_later_triggers_until_retried() {
    let h = Harness::online();
    let head = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.store.append(MutationDraft::create("training/b", json!({"sets": 2}))).unwrap();
    h.gateway.script(vec![Outcome::RemoteFailure(500); 2]);
    let engine = engine_for(&h, fast_policy(2));

    completed(engine.trigger().await.unwrap());
    let calls_after_exhaustion = h.gateway.apply_calls();

    // A plain trigger does not touch the failed head
    let summary = completed(engine.trigger().await.unwrap());
    assert!(matches!(summary.stop, StopReason::Exhausted { .. }));
    assert_eq!(h.gateway.apply_calls(), calls_after_exhaustion);

    // Manual retry clears the mark and drains everything
    let summary = completed(engine.retry_failed(&head).await.unwrap());
    assert_eq!(summary.applied.len(), 2);
    assert_eq!(summary.stop, StopReason::Drained);
    assert!(h.store.is_empty().unwrap());
}

#[tokio::test]
async fn retry_unknown_operation_is_not_found() {
    let h = Harness::online();
    let engine = engine_for(&h, fast_policy(2));

    let result = engine.retry_failed("op-missing").await;
    assert!(matches!(result, Err(Error::OpNotFound(ref id)) if id == "op-missing"));
}

#[tokio::test]
async fn auth_failure_is_not_retried() {
    let h = Harness::online();
    let id = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.gateway.set_default_apply(Outcome::AuthFailure);
    let engine = engine_for(&h, fast_policy(5));

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.stop, StopReason::AuthRejected { id: id.clone() });
    assert!(matches!(summary.error(), Some(Error::Auth { id: Some(_) })));
    assert_eq!(h.gateway.apply_calls(), 1);
    // Left in place, unmarked, for the next trigger after re-auth
    let head = h.store.head().unwrap().unwrap();
    assert_eq!(head.id, id);
    assert!(!head.is_failed());
}

#[tokio::test]
async fn repeated_connectivity_failures_mark_remote_unreachable() {
    let h = Harness::online();
    h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.gateway.set_default_apply(Outcome::ConnectivityFailure);
    let engine = engine_for(&h, fast_policy(3));

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.stop, StopReason::Unreachable);
    assert_eq!(h.gateway.apply_calls(), 3);
    assert!(!h.monitor.is_reachable());
    assert!(!h.store.head().unwrap().unwrap().is_failed());
}

#[tokio::test]
async fn unreachable_during_backoff_returns_to_idle() {
    let h = Harness::online();
    h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.gateway.set_default_apply(Outcome::RemoteFailure(503));
    let policy = BackoffPolicy {
        base_delay: Duration::from_secs(600),
        max_delay: Duration::from_secs(600),
        max_attempts: 5,
    };
    let engine = Arc::new(engine_for(&h, policy));
    let mut state = engine.subscribe_state();

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.trigger().await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SyncState::BackingOff),
    )
    .await
    .unwrap()
    .unwrap();

    h.monitor.report_probe(false);

    let summary = completed(
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap(),
    );
    assert_eq!(summary.stop, StopReason::Unreachable);
    assert_eq!(engine.state(), SyncState::Idle);
    assert_eq!(h.store.len().unwrap(), 1);
}

#[tokio::test]
async fn concurrent_trigger_is_coalesced() {
    let h = Harness::online();
    h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let engine = Arc::new(engine_for(&h, fast_policy(3)));
    h.gateway.hold();

    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.trigger().await })
    };
    h.gateway.wait_entered().await;
    assert!(engine.is_draining());
    assert_eq!(engine.state(), SyncState::Draining);

    assert_eq!(engine.trigger().await.unwrap(), DrainReport::Coalesced);

    h.gateway.release(1);
    let summary = completed(first.await.unwrap().unwrap());
    assert_eq!(summary.applied.len(), 1);
    assert_eq!(h.gateway.apply_calls(), 1);
    assert!(!engine.is_draining());
}

#[tokio::test]
async fn drain_is_exclusive_across_queue_handles() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.jsonl");
    // Two handles on one file, as two processes would have
    let first_queue = Arc::new(FileQueue::open(&path, "node").unwrap());
    let second_queue = Arc::new(FileQueue::open(&path, "node").unwrap());
    let head = first_queue
        .append(MutationDraft::create("training/a", json!({"sets": 1})))
        .unwrap();

    let h = Harness::online();
    let engine_over = |queue: &Arc<FileQueue>| {
        Arc::new(SyncEngine::new(
            Arc::clone(queue) as Arc<dyn MutationStore>,
            Arc::clone(&h.cache),
            h.gateway(),
            Arc::clone(&h.monitor),
            fast_policy(3),
        ))
    };
    let first = engine_over(&first_queue);
    let second = engine_over(&second_queue);
    h.gateway.hold();

    let running = {
        let first = Arc::clone(&first);
        tokio::spawn(async move { first.trigger().await })
    };
    h.gateway.wait_entered().await;

    assert_eq!(second.trigger().await.unwrap(), DrainReport::Coalesced);

    h.gateway.release(1);
    let summary = completed(running.await.unwrap().unwrap());
    assert_eq!(summary.applied, vec![head]);
    assert_eq!(h.gateway.apply_calls(), 1);
    assert!(second_queue.is_empty().unwrap());

    // Once the first pass ends the other handle drains normally
    let next = second_queue
        .append(MutationDraft::delete("training/a"))
        .unwrap();
    h.gateway.release(1);
    let summary = completed(second.trigger().await.unwrap());
    assert_eq!(summary.applied, vec![next]);
}

#[tokio::test]
async fn attempts_accumulate_across_unreachable_blips() {
    let h = Harness::online();
    let head = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    h.gateway.set_default_apply(Outcome::RemoteFailure(500));
    let policy = BackoffPolicy {
        base_delay: Duration::from_secs(600),
        max_delay: Duration::from_secs(600),
        max_attempts: 2,
    };
    let engine = Arc::new(engine_for(&h, policy));
    let mut state = engine.subscribe_state();

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.trigger().await })
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == SyncState::BackingOff),
    )
    .await
    .unwrap()
    .unwrap();
    h.monitor.report_probe(false);

    let summary = completed(running.await.unwrap().unwrap());
    assert_eq!(summary.stop, StopReason::Unreachable);
    assert_eq!(h.gateway.apply_calls(), 1);

    // The next pass continues the count instead of starting over
    h.monitor.report_probe(true);
    let summary = completed(engine.trigger().await.unwrap());
    assert_eq!(
        summary.stop,
        StopReason::Exhausted {
            id: head.clone(),
            attempts: 2
        }
    );
    assert_eq!(h.gateway.apply_calls(), 2);
    let marked = h.store.head().unwrap().unwrap();
    assert_eq!(marked.id, head);
    assert_eq!(marked.failure.map(|f| f.attempts), Some(2));
}

#[tokio::test]
async fn halt_on_middle_operation_preserves_order() {
    let h = Harness::online();
    let a = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let b = h.store.append(MutationDraft::create("training/b", json!({"sets": 2}))).unwrap();
    let c = h.store.append(MutationDraft::create("training/c", json!({"sets": 3}))).unwrap();
    h.gateway
        .script([Outcome::Success(Value::Null), Outcome::RemoteFailure(500)]);
    let engine = engine_for(&h, fast_policy(1));

    let summary = completed(engine.trigger().await.unwrap());
    assert_eq!(summary.applied, vec![a]);
    assert_eq!(
        summary.stop,
        StopReason::Exhausted {
            id: b.clone(),
            attempts: 1
        }
    );
    // The third operation was never attempted
    assert_eq!(h.gateway.applied_targets(), vec!["training/a", "training/b"]);
    let ids: Vec<String> = h.store.list().unwrap().into_iter().map(|op| op.id).collect();
    assert_eq!(ids, vec![b.clone(), c.clone()]);

    let summary = completed(engine.retry_failed(&b).await.unwrap());
    assert_eq!(summary.applied, vec![b, c]);
    assert_eq!(
        h.gateway.applied_targets(),
        vec!["training/a", "training/b", "training/b", "training/c"]
    );
    assert!(h.store.is_empty().unwrap());
}

#[tokio::test]
async fn unreachable_while_applying_finishes_the_call_then_stops() {
    let h = Harness::online();
    let a = h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let b = h.store.append(MutationDraft::create("training/b", json!({"sets": 2}))).unwrap();
    let engine = Arc::new(engine_for(&h, fast_policy(3)));
    h.gateway.hold();

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.trigger().await })
    };
    h.gateway.wait_entered().await;
    h.monitor.report_probe(false);
    h.gateway.release(1);

    let summary = completed(running.await.unwrap().unwrap());
    assert_eq!(summary.applied, vec![a]);
    assert_eq!(summary.stop, StopReason::Unreachable);
    assert_eq!(h.gateway.apply_calls(), 1);
    assert_eq!(
        h.cache.get("training/a").unwrap().unwrap().value,
        json!({"sets": 1})
    );
    let ids: Vec<String> = h.store.list().unwrap().into_iter().map(|op| op.id).collect();
    assert_eq!(ids, vec![b]);
    assert_eq!(engine.state(), SyncState::Idle);
}

#[tokio::test]
async fn unencodable_head_is_quarantined_and_drain_continues() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("queue.jsonl");
    std::fs::write(
        &path,
        "{\"id\":\"op-bad\",\"kind\":\"create\",\"target\":\"training/x\",\"payload\":null,\"enqueuedAt\":1}\n",
    )
    .unwrap();
    let queue = Arc::new(FileQueue::open(&path, "node").unwrap());
    let good = queue
        .append(MutationDraft::create("training/y", json!({"sets": 1})))
        .unwrap();

    let h = Harness::online();
    let engine = SyncEngine::new(
        Arc::clone(&queue) as Arc<dyn MutationStore>,
        Arc::clone(&h.cache),
        h.gateway(),
        Arc::clone(&h.monitor),
        fast_policy(3),
    );

    let summary = completed(engine.trigger().await.unwrap());

    assert_eq!(summary.applied, vec![good]);
    assert_eq!(summary.quarantined.len(), 1);
    assert_eq!(summary.quarantined[0].0, "op-bad");
    assert_eq!(h.gateway.applied_targets(), vec!["training/y"]);

    let dead = queue.quarantined().unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].op.as_ref().map(|op| op.id.as_str()), Some("op-bad"));
    assert!(queue.is_empty().unwrap());
}

#[tokio::test]
async fn run_drains_when_remote_becomes_reachable() {
    let h = Harness::offline();
    h.store.append(MutationDraft::create("training/a", json!({"sets": 1}))).unwrap();
    let engine = Arc::new(engine_for(&h, fast_policy(3)));
    let cancel = CancellationToken::new();
    let handle = engine.spawn(cancel.clone());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.gateway.apply_calls(), 0);

    h.monitor.report_probe(true);
    let store = Arc::clone(&h.store);
    wait_until(move || store.is_empty().unwrap()).await;

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn request_drain_wakes_running_loop() {
    let h = Harness::online();
    let engine = Arc::new(engine_for(&h, fast_policy(3)));
    let cancel = CancellationToken::new();
    let handle = engine.spawn(cancel.clone());

    h.store.append(MutationDraft::update("user/1", json!({"weight": 79}))).unwrap();
    engine.request_drain();

    let store = Arc::clone(&h.store);
    wait_until(move || store.is_empty().unwrap()).await;
    assert_eq!(h.gateway.applied_targets(), vec!["user/1"]);

    cancel.cancel();
    handle.await.unwrap();
}
