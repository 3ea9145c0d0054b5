//! Pool health tracking and the pull-based health reporter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use jobhub_core::registry::CategoryRegistry;
use jobhub_core::result::AppResult;
use jobhub_store::JobStore;

/// Fallback liveness window for pools whose category cannot be resolved.
const DEFAULT_LIVENESS_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct PoolStatus {
    /// Last successful claim, empty poll, or heartbeat.
    last_progress: Instant,
    /// Whether the pool is accepting new claims.
    accepting: bool,
}

/// Shared progress marks written by dispatchers and read by the reporter.
#[derive(Debug, Default)]
pub struct HealthTracker {
    pools: DashMap<String, PoolStatus>,
}

impl HealthTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a pool started and is accepting claims.
    pub fn pool_started(&self, category: &str) {
        self.pools.insert(
            category.to_string(),
            PoolStatus {
                last_progress: Instant::now(),
                accepting: true,
            },
        );
    }

    /// Record that a pool stopped accepting new claims.
    pub fn pool_stopped(&self, category: &str) {
        if let Some(mut status) = self.pools.get_mut(category) {
            status.accepting = false;
        }
    }

    /// Record forward progress for a pool.
    pub fn mark_progress(&self, category: &str) {
        if let Some(mut status) = self.pools.get_mut(category) {
            status.last_progress = Instant::now();
        }
    }

    /// Whether the pool is accepting claims. `None` if it never started.
    pub fn accepting(&self, category: &str) -> Option<bool> {
        self.pools.get(category).map(|s| s.accepting)
    }

    /// Whether the pool made progress within the window. `None` if it
    /// never started.
    pub fn progressed_within(&self, category: &str, window: Duration) -> Option<bool> {
        self.pools
            .get(category)
            .map(|s| s.last_progress.elapsed() <= window)
    }

    fn started_pools(&self) -> Vec<(String, PoolStatus)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

/// Health snapshot for one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryHealth {
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
    /// Age in seconds of the oldest eligible pending job.
    pub oldest_pending_seconds: Option<i64>,
    /// Whether the pool made progress within its liveness window.
    pub alive: bool,
    /// Whether the pool is currently accepting claims.
    pub ready: bool,
}

/// Aggregates per-category queue statistics and pool liveness.
///
/// Pull-based: external orchestration queries it and decides about
/// restarts or scaling; the reporter itself takes no corrective action.
pub struct HealthReporter {
    store: Arc<dyn JobStore>,
    registry: Arc<CategoryRegistry>,
    tracker: Arc<HealthTracker>,
}

impl std::fmt::Debug for HealthReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthReporter").finish()
    }
}

impl HealthReporter {
    /// Create a reporter over the store, registry, and tracker.
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<CategoryRegistry>,
        tracker: Arc<HealthTracker>,
    ) -> Self {
        Self {
            store,
            registry,
            tracker,
        }
    }

    fn liveness_window(&self, category: &str) -> Duration {
        self.registry
            .resolve(category)
            .map(|entry| entry.claim_timeout)
            .unwrap_or(DEFAULT_LIVENESS_WINDOW)
    }

    /// Full per-category snapshot, including queue depths from the store.
    pub async fn snapshot(&self) -> AppResult<Vec<CategoryHealth>> {
        let mut snapshot = Vec::new();
        for entry in self.registry.categories() {
            let stats = self.store.queue_stats(&entry.name).await?;
            snapshot.push(CategoryHealth {
                category: entry.name.clone(),
                pending: stats.pending,
                claimed: stats.claimed,
                running: stats.running,
                succeeded: stats.succeeded,
                failed: stats.failed,
                abandoned: stats.abandoned,
                oldest_pending_seconds: stats.oldest_pending_seconds,
                alive: self
                    .tracker
                    .progressed_within(&entry.name, entry.claim_timeout)
                    .unwrap_or(false),
                ready: self.tracker.accepting(&entry.name).unwrap_or(false),
            });
        }
        snapshot.sort_by(|a, b| a.category.cmp(&b.category));
        Ok(snapshot)
    }

    /// Liveness probe: every running pool made progress recently.
    ///
    /// True when no pool has started (an API-only instance is alive).
    pub fn live(&self) -> bool {
        self.tracker
            .started_pools()
            .into_iter()
            .filter(|(_, status)| status.accepting)
            .all(|(category, status)| {
                status.last_progress.elapsed() <= self.liveness_window(&category)
            })
    }

    /// Readiness probe: no started pool has stopped accepting claims.
    pub fn ready(&self) -> bool {
        self.tracker
            .started_pools()
            .into_iter()
            .all(|(_, status)| status.accepting)
    }
}
