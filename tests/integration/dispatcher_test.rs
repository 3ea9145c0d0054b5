//! Dispatcher behavior: outcome mapping, retry policy, concurrency
//! bounds, and graceful shutdown.

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;

use jobhub_entity::job::JobState;

use crate::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_happy_path_reports_result() {
    let registry = registry(vec![category("export", 1, 3)]);
    let worker = TestWorker::start(
        registry,
        vec![SucceedHandler::new("export", json!({"archive": "export-1.zip"}))],
    );

    let job = worker
        .store
        .submit("export", json!({"dataset": 17}))
        .await
        .unwrap();
    let done = wait_for_state(&*worker.store, job.id, JobState::Succeeded, WAIT).await;

    assert_eq!(done.attempt, 1);
    assert_eq!(done.result, Some(json!({"archive": "export-1.zip"})));
    assert!(done.error.is_none());
    assert!(done.claimed_by.is_none());

    worker.shutdown().await;
}

#[tokio::test]
async fn test_retry_then_succeed_on_third_attempt() {
    let registry = registry(vec![category("export", 1, 3)]);
    let worker = TestWorker::start(registry, vec![FlakyHandler::new("export", 2)]);

    let job = worker.store.submit("export", json!({})).await.unwrap();
    let done = wait_for_state(&*worker.store, job.id, JobState::Succeeded, WAIT).await;

    assert_eq!(done.attempt, 3);
    assert_eq!(done.result, Some(json!({"recovered_after": 2})));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_retryable_exhaustion_abandons() {
    let registry = registry(vec![category("export", 1, 2)]);
    let worker = TestWorker::start(registry, vec![FailingHandler::new("export", true)]);

    let job = worker.store.submit("export", json!({})).await.unwrap();
    let done = wait_for_state(&*worker.store, job.id, JobState::Abandoned, WAIT).await;

    // Abandoned, not failed: the platform gave up, the handler did not reject.
    assert_eq!(done.attempt, 2);
    assert_eq!(done.error.as_deref(), Some("transient breakage"));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_terminal_failure_short_circuits_attempts() {
    let registry = registry(vec![category("export", 1, 5)]);
    let worker = TestWorker::start(registry, vec![FailingHandler::new("export", false)]);

    let job = worker.store.submit("export", json!({})).await.unwrap();
    let done = wait_for_state(&*worker.store, job.id, JobState::Failed, WAIT).await;

    assert_eq!(done.attempt, 1);
    assert_eq!(done.error.as_deref(), Some("payload can never succeed"));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_admission_gate_bounds_concurrency() {
    let registry = registry(vec![category("chunks", 2, 1)]);
    let handler = SlowHandler::new("chunks", Duration::from_millis(100));
    let worker = TestWorker::start(registry, vec![handler.clone()]);

    let mut ids = Vec::new();
    for i in 0..5 {
        let job = worker.store.submit("chunks", json!({"chunk": i})).await.unwrap();
        ids.push(job.id);
    }
    for id in ids {
        wait_for_state(&*worker.store, id, JobState::Succeeded, WAIT).await;
    }

    assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 2);

    worker.shutdown().await;
}

#[tokio::test]
async fn test_categories_drain_independently() {
    // A backlog in one category must not block another.
    let registry = registry(vec![category("export", 1, 1), category("webhooks", 1, 1)]);
    let slow = SlowHandler::new("export", Duration::from_secs(2));
    let worker = TestWorker::start(
        registry,
        vec![slow, SucceedHandler::new("webhooks", json!({"delivered": true}))],
    );

    worker.store.submit("export", json!({})).await.unwrap();
    let hook = worker.store.submit("webhooks", json!({})).await.unwrap();

    let done = wait_for_state(&*worker.store, hook.id, JobState::Succeeded, WAIT).await;
    assert_eq!(done.result, Some(json!({"delivered": true})));

    worker.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_stops_accepting_and_cancels_stragglers() {
    let registry = registry(vec![category("export", 1, 3)]);
    let handler = SlowHandler::new("export", Duration::from_secs(30));
    let worker = TestWorker::start(registry, vec![handler.clone()]);

    let job = worker.store.submit("export", json!({})).await.unwrap();
    wait_for_state(&*worker.store, job.id, JobState::Running, WAIT).await;

    let tracker = worker.tracker.clone();
    let store = worker.store.clone();
    worker.shutdown().await;

    // The pool stopped accepting claims and the straggler got the stop
    // signal once the grace period ran out.
    assert_eq!(tracker.accepting("export"), Some(false));
    let requeued = wait_for_state(&*store, job.id, JobState::Pending, WAIT).await;
    assert!(handler.cancelled.load(Ordering::SeqCst));

    // The cancelled attempt counts against the budget; no outcome recorded.
    assert_eq!(requeued.attempt, 1);
    assert!(requeued.error.is_none());
}

#[tokio::test]
async fn test_unhandled_category_pool_not_started() {
    let registry = registry(vec![category("export", 1, 3), category("import", 1, 3)]);
    let worker = TestWorker::start(registry, vec![SucceedHandler::new("export", json!(null))]);

    let job = worker.store.submit("export", json!({})).await.unwrap();
    wait_for_state(&*worker.store, job.id, JobState::Succeeded, WAIT).await;

    // No pool ever started for the handler-less category.
    assert_eq!(worker.tracker.accepting("import"), None);
    let stuck = worker.store.submit("import", json!({})).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let pending = worker.store.get(stuck.id).await.unwrap().unwrap();
    assert_eq!(pending.state, JobState::Pending);

    worker.shutdown().await;
}
