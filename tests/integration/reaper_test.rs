//! Stale-claim recovery: heartbeat timeouts, idempotent sweeps, and
//! crashed-worker handoff back to a live pool.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use jobhub_core::registry::{CategoryEntry, RetryBackoff};
use jobhub_entity::job::JobState;
use jobhub_store::JobStore;
use jobhub_store::memory::MemoryJobStore;
use jobhub_worker::StaleClaimReaper;

use crate::helpers::*;

const WAIT: Duration = Duration::from_secs(5);

/// Category with a claim timeout short enough to expire in-test.
fn expiring_category(name: &str, attempt_limit: i32) -> CategoryEntry {
    CategoryEntry {
        name: name.to_string(),
        max_concurrency: 1,
        attempt_limit,
        retry_backoff: RetryBackoff::Fixed {
            delay: Duration::ZERO,
        },
        claim_timeout: Duration::from_millis(150),
    }
}

#[tokio::test]
async fn test_sweep_requeues_crashed_worker_claim() {
    let registry = registry(vec![expiring_category("export", 3)]);
    let store = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
    let reaper = StaleClaimReaper::new(
        Arc::clone(&registry),
        store.clone() as Arc<dyn JobStore>,
        Duration::from_secs(60),
    );

    // A worker claims, starts, then "crashes" without heartbeating.
    let job = store.submit("export", json!({})).await.unwrap();
    store.claim_next("export", "dead-worker").await.unwrap().unwrap();
    store.start(job.id, "dead-worker").await.unwrap();

    // Fresh claim: the sweep must not touch it.
    reaper.sweep().await;
    assert!(store.get(job.id).await.unwrap().unwrap().state.is_claimed());

    tokio::time::sleep(Duration::from_millis(200)).await;
    reaper.sweep().await;

    let recovered = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(recovered.state, JobState::Pending);
    assert!(recovered.claimed_by.is_none());

    // The dead worker's late result is rejected.
    let err = store.complete(job.id, "dead-worker", None).await.unwrap_err();
    assert!(err.is_stale_claim());
}

#[tokio::test]
async fn test_sweep_abandons_when_budget_spent() {
    let registry = registry(vec![expiring_category("export", 1)]);
    let store = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
    let reaper = StaleClaimReaper::new(
        Arc::clone(&registry),
        store.clone() as Arc<dyn JobStore>,
        Duration::from_secs(60),
    );

    let job = store.submit("export", json!({})).await.unwrap();
    store.claim_next("export", "dead-worker").await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    reaper.sweep().await;

    let abandoned = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(abandoned.state, JobState::Abandoned);
    assert!(abandoned.error.is_some());

    // A second sweep against the recovered job is a no-op.
    reaper.sweep().await;
    let unchanged = store.get(job.id).await.unwrap().unwrap();
    assert_eq!(unchanged.updated_at, abandoned.updated_at);
}

#[tokio::test]
async fn test_recovered_job_is_picked_up_by_live_pool() {
    let registry = registry(vec![expiring_category("export", 3)]);
    let store = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
    let store: Arc<dyn JobStore> = store;

    // Orphan a claim before any pool runs: a worker that never heartbeats.
    let job = store.submit("export", json!({})).await.unwrap();
    store.claim_next("export", "dead-worker").await.unwrap().unwrap();

    let worker = TestWorker::start_with_store(
        Arc::clone(&registry),
        store.clone(),
        vec![SucceedHandler::new("export", json!({"rescued": true}))],
        test_settings(),
    );
    let reaper = StaleClaimReaper::new(registry, store.clone(), Duration::from_millis(50));
    let (reaper_tx, reaper_rx) = tokio::sync::watch::channel(false);
    let reaper_handle = tokio::spawn(async move { reaper.run(reaper_rx).await });

    // The orphaned claim expires and the live pool finishes the job.
    let done = wait_for_state(&*store, job.id, JobState::Succeeded, WAIT).await;
    assert_eq!(done.attempt, 2);
    assert_eq!(done.result, Some(json!({"rescued": true})));

    let _ = reaper_tx.send(true);
    let _ = reaper_handle.await;
    worker.shutdown().await;
}
