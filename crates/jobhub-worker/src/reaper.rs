//! Stale-claim reaper: requeues jobs whose worker stopped heartbeating.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use jobhub_core::registry::CategoryRegistry;
use jobhub_store::JobStore;

/// Fixed-interval sweep over all categories, independent of any single
/// dispatcher, so a fully stuck pool can still be reaped.
///
/// This is also the only crash-recovery mechanism: claims orphaned by a
/// crashed process become stale and are requeued or abandoned here.
pub struct StaleClaimReaper {
    registry: Arc<CategoryRegistry>,
    store: Arc<dyn JobStore>,
    interval: Duration,
}

impl std::fmt::Debug for StaleClaimReaper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleClaimReaper")
            .field("interval", &self.interval)
            .finish()
    }
}

impl StaleClaimReaper {
    /// Create a reaper sweeping at the given interval.
    pub fn new(
        registry: Arc<CategoryRegistry>,
        store: Arc<dyn JobStore>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            interval,
        }
    }

    /// Run sweeps until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Stale-claim reaper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("Stale-claim reaper shut down");
    }

    /// One sweep over every registered category.
    ///
    /// Idempotent: the store re-evaluates staleness before mutating, so
    /// sweeping an already-recovered job is a no-op.
    pub async fn sweep(&self) {
        for entry in self.registry.categories() {
            let Ok(timeout) = ChronoDuration::from_std(entry.claim_timeout) else {
                continue;
            };
            let cutoff = Utc::now() - timeout;

            let stale = match self.store.list_stale(&entry.name, cutoff).await {
                Ok(stale) => stale,
                Err(e) => {
                    warn!(category = %entry.name, error = %e, "Failed to list stale claims");
                    continue;
                }
            };

            if stale.is_empty() {
                continue;
            }
            warn!(
                category = %entry.name,
                count = stale.len(),
                "Recovering stale claims"
            );

            for job in stale {
                if let Err(e) = self.store.requeue_or_abandon(job.id).await {
                    warn!(job_id = %job.id, error = %e, "Failed to recover stale claim");
                }
            }
        }
    }
}
