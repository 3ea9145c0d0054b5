//! Job store trait: the contract every provider implements.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jobhub_core::result::AppResult;
use jobhub_core::types::pagination::{PageRequest, PageResponse};
use jobhub_entity::job::{Job, JobState};

/// Persistent, crash-tolerant job queue keyed by category.
///
/// Every mutation is an atomic compare-and-swap-style transition: the
/// at-most-one-claimant invariant is enforced here, not by caller
/// discipline. Ownership-checked operations (`start`, `heartbeat`,
/// `complete`, `fail`) fail with a `StaleClaim` error when the job is no
/// longer claimed by the given worker, signalling that the worker's
/// in-flight outcome must be discarded.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new job as `pending`, available immediately.
    ///
    /// Fails with `UnknownCategory` if the category is not registered;
    /// the attempt budget is resolved from the registry entry and copied
    /// onto the record.
    async fn submit(&self, category: &str, payload: serde_json::Value) -> AppResult<Job>;

    /// Atomically claim the oldest eligible `pending` job in a category.
    ///
    /// Eligible means `available_at <= now`; order is FIFO by submission
    /// time. Sets `claimed_by`, `claimed_at`, `last_heartbeat` and
    /// increments `attempt`. Returns `None` when no eligible job exists.
    async fn claim_next(&self, category: &str, worker_id: &str) -> AppResult<Option<Job>>;

    /// Transition a claimed job to `running`.
    async fn start(&self, id: Uuid, worker_id: &str) -> AppResult<()>;

    /// Refresh the claim's liveness signal.
    async fn heartbeat(&self, id: Uuid, worker_id: &str) -> AppResult<()>;

    /// Terminal success transition; stores the result exactly once.
    async fn complete(
        &self,
        id: Uuid,
        worker_id: &str,
        result: Option<serde_json::Value>,
    ) -> AppResult<()>;

    /// Failure transition.
    ///
    /// Retryable failures requeue with backoff while the attempt budget
    /// lasts, then transition to `abandoned`. Non-retryable failures
    /// transition to `failed` immediately, regardless of remaining budget.
    async fn fail(&self, id: Uuid, worker_id: &str, error: &str, retryable: bool) -> AppResult<()>;

    /// Claimed/running jobs whose `last_heartbeat` is older than the cutoff.
    async fn list_stale(&self, category: &str, older_than: DateTime<Utc>) -> AppResult<Vec<Job>>;

    /// Recover a job whose claim went stale.
    ///
    /// Re-evaluates staleness against the category's claim timeout before
    /// mutating, so re-running against an already-recovered job is a
    /// no-op. Requeues with backoff if attempts remain, else `abandoned`.
    async fn requeue_or_abandon(&self, id: Uuid) -> AppResult<()>;

    /// Fetch a job by id.
    async fn get(&self, id: Uuid) -> AppResult<Option<Job>>;

    /// List jobs, newest first, optionally filtered by category and state.
    async fn list(
        &self,
        category: Option<&str>,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Job>>;

    /// Per-state counts and queue-depth proxy for one category.
    async fn queue_stats(&self, category: &str) -> AppResult<QueueStats>;

    /// Check that the backing storage is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Per-category queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Category name.
    pub category: String,
    /// Jobs waiting to be claimed.
    pub pending: i64,
    /// Jobs claimed but not yet running.
    pub claimed: i64,
    /// Jobs currently executing.
    pub running: i64,
    /// Jobs that completed successfully.
    pub succeeded: i64,
    /// Jobs that failed terminally.
    pub failed: i64,
    /// Jobs whose attempt budget was exhausted.
    pub abandoned: i64,
    /// Age in seconds of the oldest eligible pending job, if any.
    pub oldest_pending_seconds: Option<i64>,
}
