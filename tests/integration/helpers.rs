//! Shared test helpers: registries, handlers, and a worker harness.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use jobhub_core::registry::{CategoryEntry, CategoryRegistry, RetryBackoff};
use jobhub_entity::job::{Job, JobState};
use jobhub_store::JobStore;
use jobhub_store::memory::MemoryJobStore;
use jobhub_worker::{
    DispatcherSettings, HealthTracker, JobError, JobExecutor, WorkerRunner,
};

/// Category entry with test-friendly timings and no retry delay.
pub fn category(name: &str, max_concurrency: usize, attempt_limit: i32) -> CategoryEntry {
    CategoryEntry {
        name: name.to_string(),
        max_concurrency,
        attempt_limit,
        retry_backoff: RetryBackoff::Fixed {
            delay: Duration::ZERO,
        },
        claim_timeout: Duration::from_secs(30),
    }
}

pub fn registry(entries: Vec<CategoryEntry>) -> Arc<CategoryRegistry> {
    let mut registry = CategoryRegistry::new();
    for entry in entries {
        registry.register(entry).unwrap();
    }
    Arc::new(registry)
}

/// Dispatcher settings tight enough for fast tests.
pub fn test_settings() -> DispatcherSettings {
    DispatcherSettings {
        poll_interval: Duration::from_millis(20),
        idle_backoff_cap: Duration::from_millis(50),
        store_error_backoff: Duration::from_millis(20),
        shutdown_grace: Duration::from_millis(500),
    }
}

/// A running worker tier over an in-memory store.
pub struct TestWorker {
    pub store: Arc<dyn JobStore>,
    pub tracker: Arc<HealthTracker>,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestWorker {
    /// Start a runner with the given handlers and default test settings.
    pub fn start(
        registry: Arc<CategoryRegistry>,
        handlers: Vec<Arc<dyn jobhub_worker::JobHandler>>,
    ) -> Self {
        Self::start_with_settings(registry, handlers, test_settings())
    }

    pub fn start_with_settings(
        registry: Arc<CategoryRegistry>,
        handlers: Vec<Arc<dyn jobhub_worker::JobHandler>>,
        settings: DispatcherSettings,
    ) -> Self {
        let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new(Arc::clone(&registry)));
        Self::start_with_store(registry, store, handlers, settings)
    }

    /// Start a runner over an existing store (e.g., with pre-seeded jobs).
    pub fn start_with_store(
        registry: Arc<CategoryRegistry>,
        store: Arc<dyn JobStore>,
        handlers: Vec<Arc<dyn jobhub_worker::JobHandler>>,
        settings: DispatcherSettings,
    ) -> Self {
        let tracker = Arc::new(HealthTracker::new());

        let mut executor = JobExecutor::new();
        for handler in handlers {
            executor.register(handler);
        }

        let runner = WorkerRunner::with_settings(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::new(executor),
            Arc::clone(&tracker),
            settings,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        Self {
            store,
            tracker,
            shutdown_tx,
            handle,
        }
    }

    /// Signal shutdown and wait for the runner to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Poll the store until the job reaches the expected state.
pub async fn wait_for_state(
    store: &dyn JobStore,
    id: Uuid,
    state: JobState,
    timeout: Duration,
) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(job) = store.get(id).await.unwrap() {
            if job.state == state {
                return job;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for job {id} to reach state '{state}'"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler that always succeeds with a fixed result.
#[derive(Debug)]
pub struct SucceedHandler {
    category: String,
    result: Value,
}

impl SucceedHandler {
    pub fn new(category: &str, result: Value) -> Arc<Self> {
        Arc::new(Self {
            category: category.to_string(),
            result,
        })
    }
}

#[async_trait]
impl jobhub_worker::JobHandler for SucceedHandler {
    fn category(&self) -> &str {
        &self.category
    }

    async fn run(&self, _job: &Job, _cancel: CancellationToken) -> Result<Option<Value>, JobError> {
        Ok(Some(self.result.clone()))
    }
}

/// Handler that fails retryably a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyHandler {
    category: String,
    failures: u32,
    invocations: AtomicU32,
}

impl FlakyHandler {
    pub fn new(category: &str, failures: u32) -> Arc<Self> {
        Arc::new(Self {
            category: category.to_string(),
            failures,
            invocations: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl jobhub_worker::JobHandler for FlakyHandler {
    fn category(&self) -> &str {
        &self.category
    }

    async fn run(&self, _job: &Job, _cancel: CancellationToken) -> Result<Option<Value>, JobError> {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst);
        if invocation < self.failures {
            Err(JobError::Retryable(format!(
                "transient failure {invocation}"
            )))
        } else {
            Ok(Some(json!({"recovered_after": invocation})))
        }
    }
}

/// Handler that always fails with the given retryability.
#[derive(Debug)]
pub struct FailingHandler {
    category: String,
    retryable: bool,
}

impl FailingHandler {
    pub fn new(category: &str, retryable: bool) -> Arc<Self> {
        Arc::new(Self {
            category: category.to_string(),
            retryable,
        })
    }
}

#[async_trait]
impl jobhub_worker::JobHandler for FailingHandler {
    fn category(&self) -> &str {
        &self.category
    }

    async fn run(&self, _job: &Job, _cancel: CancellationToken) -> Result<Option<Value>, JobError> {
        if self.retryable {
            Err(JobError::Retryable("transient breakage".to_string()))
        } else {
            Err(JobError::Terminal("payload can never succeed".to_string()))
        }
    }
}

/// Handler that sleeps, tracking concurrency and cancellation.
#[derive(Debug)]
pub struct SlowHandler {
    category: String,
    duration: Duration,
    pub in_flight: AtomicI32,
    pub max_in_flight: AtomicI32,
    pub cancelled: AtomicBool,
}

impl SlowHandler {
    pub fn new(category: &str, duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            category: category.to_string(),
            duration,
            in_flight: AtomicI32::new(0),
            max_in_flight: AtomicI32::new(0),
            cancelled: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl jobhub_worker::JobHandler for SlowHandler {
    fn category(&self) -> &str {
        &self.category
    }

    async fn run(&self, _job: &Job, cancel: CancellationToken) -> Result<Option<Value>, JobError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let outcome = tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(None),
            _ = cancel.cancelled() => {
                self.cancelled.store(true, Ordering::SeqCst);
                Err(JobError::Retryable("cancelled".to_string()))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}
