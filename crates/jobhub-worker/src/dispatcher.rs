//! Per-category dispatcher: claims jobs, bounds concurrency, supervises
//! handler execution with heartbeats and cooperative cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jobhub_core::config::worker::WorkerConfig;
use jobhub_core::registry::CategoryEntry;
use jobhub_entity::job::Job;
use jobhub_store::JobStore;

use crate::handler::{JobError, JobHandler};
use crate::health::HealthTracker;

/// Claim-poll and shutdown settings shared by all dispatchers.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Base sleep between claim polls on an empty queue.
    pub poll_interval: Duration,
    /// Upper bound on the idle poll backoff.
    pub idle_backoff_cap: Duration,
    /// Sleep after a store-level error before retrying.
    pub store_error_backoff: Duration,
    /// How long to wait for in-flight jobs during shutdown.
    pub shutdown_grace: Duration,
}

impl DispatcherSettings {
    /// Build settings from worker configuration.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            idle_backoff_cap: Duration::from_millis(config.idle_backoff_cap_ms),
            store_error_backoff: Duration::from_millis(config.store_error_backoff_ms),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&WorkerConfig::default())
    }
}

/// Outcome of a handler invocation, to be resolved against the store.
enum Outcome {
    Success(Option<Value>),
    Failure { message: String, retryable: bool },
}

/// Dispatcher for one job category.
///
/// Owns an admission gate of `max_concurrency` permits; a permit is
/// acquired before claiming and returned only when the execution unit for
/// the job has actually exited.
pub struct Dispatcher {
    entry: Arc<CategoryEntry>,
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    settings: DispatcherSettings,
    tracker: Arc<HealthTracker>,
    cancel_root: CancellationToken,
    worker_id: String,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("category", &self.entry.name)
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher for a category.
    pub fn new(
        entry: Arc<CategoryEntry>,
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        settings: DispatcherSettings,
        tracker: Arc<HealthTracker>,
        cancel_root: CancellationToken,
    ) -> Self {
        let worker_id = format!(
            "{}-worker-{}",
            entry.name,
            &Uuid::new_v4().to_string()[..8]
        );
        Self {
            entry,
            store,
            handler,
            settings,
            tracker,
            cancel_root,
            worker_id,
        }
    }

    /// The worker identity used for claims.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run the claim loop until the shutdown signal flips.
    ///
    /// On shutdown the dispatcher stops claiming, then waits up to the
    /// grace period for in-flight jobs; whatever remains is left for the
    /// stale-claim reaper.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let max_permits = self.entry.max_concurrency;
        let semaphore = Arc::new(Semaphore::new(max_permits));
        let mut idle = self.settings.poll_interval;

        self.tracker.pool_started(&self.entry.name);
        info!(
            category = %self.entry.name,
            worker_id = %self.worker_id,
            max_concurrency = max_permits,
            "Dispatcher started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    }
                }
            };

            match self
                .store
                .claim_next(&self.entry.name, &self.worker_id)
                .await
            {
                Ok(Some(job)) => {
                    self.tracker.mark_progress(&self.entry.name);
                    idle = self.settings.poll_interval;
                    self.spawn_supervision(job, permit);
                }
                Ok(None) => {
                    drop(permit);
                    // An empty poll still proves the loop is making progress.
                    self.tracker.mark_progress(&self.entry.name);
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(idle) => {}
                    }
                    idle = (idle * 2).min(self.settings.idle_backoff_cap);
                }
                Err(e) => {
                    drop(permit);
                    warn!(
                        category = %self.entry.name,
                        error = %e,
                        "Store error while claiming, backing off"
                    );
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(self.settings.store_error_backoff) => {}
                    }
                }
            }
        }

        self.tracker.pool_stopped(&self.entry.name);
        info!(
            category = %self.entry.name,
            "Dispatcher waiting for in-flight jobs to complete..."
        );
        let _ = tokio::time::timeout(
            self.settings.shutdown_grace,
            semaphore.acquire_many(max_permits as u32),
        )
        .await;
        info!(category = %self.entry.name, "Dispatcher shut down");
    }

    fn spawn_supervision(&self, job: Job, permit: OwnedSemaphorePermit) {
        let store = Arc::clone(&self.store);
        let handler = Arc::clone(&self.handler);
        let tracker = Arc::clone(&self.tracker);
        let entry = Arc::clone(&self.entry);
        let worker_id = self.worker_id.clone();
        let cancel = self.cancel_root.child_token();
        let store_error_backoff = self.settings.store_error_backoff;

        tokio::spawn(async move {
            let _permit = permit;
            supervise_job(
                store,
                handler,
                tracker,
                entry,
                worker_id,
                job,
                cancel,
                store_error_backoff,
            )
            .await;
        });
    }
}

/// Supervise one claimed job: transition it to running, heartbeat while
/// the handler executes, and resolve the outcome against the store.
#[allow(clippy::too_many_arguments)]
async fn supervise_job(
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    tracker: Arc<HealthTracker>,
    entry: Arc<CategoryEntry>,
    worker_id: String,
    job: Job,
    cancel: CancellationToken,
    store_error_backoff: Duration,
) {
    match store.start(job.id, &worker_id).await {
        Ok(()) => {}
        Err(e) if e.is_stale_claim() => {
            debug!(job_id = %job.id, "Claim lost before start, discarding");
            return;
        }
        Err(e) => {
            // The claim stays in place; the reaper will recover it.
            warn!(job_id = %job.id, error = %e, "Store error starting job");
            return;
        }
    }

    info!(
        job_id = %job.id,
        category = %job.category,
        attempt = job.attempt,
        max_attempts = job.max_attempts,
        "Processing job"
    );

    let handler_job = job.clone();
    let handler_cancel = cancel.clone();
    let mut invocation =
        tokio::spawn(async move { handler.run(&handler_job, handler_cancel).await });

    let mut ticker = tokio::time::interval(entry.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let joined = loop {
        tokio::select! {
            joined = &mut invocation => break joined,
            _ = ticker.tick() => {
                match store.heartbeat(job.id, &worker_id).await {
                    Ok(()) => tracker.mark_progress(&job.category),
                    Err(e) if e.is_stale_claim() => {
                        // The reaper reassigned ownership. Signal the handler
                        // to stop and release the slot once it actually exits;
                        // whatever it produces is discarded.
                        debug!(job_id = %job.id, "Claim reassigned mid-execution, cancelling handler");
                        cancel.cancel();
                        let _ = (&mut invocation).await;
                        return;
                    }
                    Err(e) => {
                        warn!(job_id = %job.id, error = %e, "Heartbeat store error");
                    }
                }
            }
        }
    };

    let outcome = match joined {
        Ok(Ok(result)) => Outcome::Success(result),
        Ok(Err(JobError::Retryable(message))) => {
            warn!(job_id = %job.id, error = %message, "Job failed (retryable)");
            Outcome::Failure {
                message,
                retryable: true,
            }
        }
        Ok(Err(JobError::Terminal(message))) => {
            error!(job_id = %job.id, error = %message, "Job failed permanently");
            Outcome::Failure {
                message,
                retryable: false,
            }
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Handler panicked");
            Outcome::Failure {
                message: format!("Handler panicked: {e}"),
                retryable: true,
            }
        }
    };

    resolve_outcome(&*store, &job, &worker_id, outcome, store_error_backoff).await;
}

/// Write a handler outcome back to the store, retrying transient store
/// errors a bounded number of times. A stale claim discards the outcome.
async fn resolve_outcome(
    store: &dyn JobStore,
    job: &Job,
    worker_id: &str,
    outcome: Outcome,
    store_error_backoff: Duration,
) {
    const RESOLVE_ATTEMPTS: u32 = 3;

    for attempt in 1..=RESOLVE_ATTEMPTS {
        let result = match &outcome {
            Outcome::Success(result) => store.complete(job.id, worker_id, result.clone()).await,
            Outcome::Failure { message, retryable } => {
                store.fail(job.id, worker_id, message, *retryable).await
            }
        };

        match result {
            Ok(()) => {
                if matches!(outcome, Outcome::Success(_)) {
                    info!(job_id = %job.id, "Job completed successfully");
                }
                return;
            }
            Err(e) if e.is_stale_claim() => {
                debug!(job_id = %job.id, "Claim reassigned, discarding outcome");
                return;
            }
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    attempt,
                    error = %e,
                    "Store error resolving job outcome, retrying"
                );
                tokio::time::sleep(store_error_backoff).await;
            }
        }
    }

    // The claim is still held as far as the store knows; the reaper will
    // recover the job once the heartbeat goes stale.
    error!(job_id = %job.id, "Giving up resolving job outcome");
}
