//! Worker runner: builds and runs one dispatcher per category.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jobhub_core::config::worker::WorkerConfig;
use jobhub_core::registry::CategoryRegistry;
use jobhub_store::JobStore;

use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::handler::JobExecutor;
use crate::health::HealthTracker;

/// Runs one [`Dispatcher`] per registered category with a handler.
///
/// Dispatchers share nothing but the job store and the shutdown signal;
/// each category's backlog drains independently of the others.
pub struct WorkerRunner {
    registry: Arc<CategoryRegistry>,
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    tracker: Arc<HealthTracker>,
    settings: DispatcherSettings,
}

impl std::fmt::Debug for WorkerRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRunner").finish()
    }
}

impl WorkerRunner {
    /// Create a runner from configuration.
    pub fn new(
        registry: Arc<CategoryRegistry>,
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
        tracker: Arc<HealthTracker>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            tracker,
            settings: DispatcherSettings::from_config(config),
        }
    }

    /// Create a runner with explicit dispatcher settings.
    pub fn with_settings(
        registry: Arc<CategoryRegistry>,
        store: Arc<dyn JobStore>,
        executor: Arc<JobExecutor>,
        tracker: Arc<HealthTracker>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            registry,
            store,
            executor,
            tracker,
            settings,
        }
    }

    /// Run all dispatchers until the shutdown signal flips.
    ///
    /// A registered category without a handler is logged and skipped; its
    /// pool stays not-ready until a process with that handler runs.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let cancel_root = CancellationToken::new();
        let mut handles = Vec::new();

        for entry in self.registry.categories() {
            let Some(handler) = self.executor.get(&entry.name) else {
                warn!(
                    category = %entry.name,
                    "No handler registered for category, pool not started"
                );
                continue;
            };

            let dispatcher = Dispatcher::new(
                entry,
                Arc::clone(&self.store),
                handler,
                self.settings.clone(),
                Arc::clone(&self.tracker),
                cancel_root.child_token(),
            );
            let rx = shutdown.clone();
            handles.push(tokio::spawn(async move { dispatcher.run(rx).await }));
        }

        if handles.is_empty() {
            info!("No worker pools started");
        } else {
            info!(pools = handles.len(), "Worker pools started");
        }

        futures::future::join_all(handles).await;

        // Each dispatcher has already waited out its grace period. Tell any
        // handler still running to stop; its claim is left for the reaper.
        cancel_root.cancel();
        info!("Worker runner shut down");
    }
}
