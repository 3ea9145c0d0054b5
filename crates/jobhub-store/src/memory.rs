//! In-memory job store for development and tests.
//!
//! Single-process only: jobs survive for the lifetime of the process.
//! Semantics are identical to the PostgreSQL provider; every transition
//! happens under one mutex, which is what makes claims atomic here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::debug;
use uuid::Uuid;

use jobhub_core::error::AppError;
use jobhub_core::registry::CategoryRegistry;
use jobhub_core::result::AppResult;
use jobhub_core::types::pagination::{PageRequest, PageResponse};
use jobhub_entity::job::{Job, JobState};

use crate::store::{JobStore, QueueStats};

/// Mutex-guarded in-memory job store.
#[derive(Debug)]
pub struct MemoryJobStore {
    registry: Arc<CategoryRegistry>,
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    jobs: HashMap<Uuid, Job>,
    /// Submission order, used as a FIFO tiebreak for equal timestamps.
    seq: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl MemoryJobStore {
    /// Create an empty store bound to a category registry.
    pub fn new(registry: Arc<CategoryRegistry>) -> Self {
        Self {
            registry,
            inner: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn backoff_until(&self, job: &Job) -> AppResult<DateTime<Utc>> {
        let entry = self.registry.resolve(&job.category)?;
        let delay = entry.retry_backoff.delay_for(job.attempt);
        let delay = ChronoDuration::from_std(delay)
            .map_err(|e| AppError::internal(format!("Backoff out of range: {e}")))?;
        Ok(Utc::now() + delay)
    }
}

fn clear_claim(job: &mut Job) {
    job.claimed_by = None;
    job.claimed_at = None;
    job.last_heartbeat = None;
}

fn owned_by(job: &Job, worker_id: &str) -> bool {
    job.state.is_claimed() && job.claimed_by.as_deref() == Some(worker_id)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn submit(&self, category: &str, payload: serde_json::Value) -> AppResult<Job> {
        let entry = self.registry.resolve(category)?;
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            category: category.to_string(),
            payload,
            result: None,
            error: None,
            state: JobState::Pending,
            attempt: 0,
            max_attempts: entry.attempt_limit,
            claimed_by: None,
            claimed_at: None,
            last_heartbeat: None,
            available_at: now,
            submitted_at: now,
            updated_at: now,
        };

        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.seq.insert(job.id, seq);
        state.jobs.insert(job.id, job.clone());

        debug!(job_id = %job.id, category, "Job submitted");
        Ok(job)
    }

    async fn claim_next(&self, category: &str, worker_id: &str) -> AppResult<Option<Job>> {
        let now = Utc::now();
        let mut state = self.lock();

        let next = state
            .jobs
            .values()
            .filter(|j| {
                j.category == category && j.state == JobState::Pending && j.available_at <= now
            })
            .map(|j| (j.submitted_at, state.seq.get(&j.id).copied().unwrap_or(0), j.id))
            .min();

        let Some((_, _, id)) = next else {
            return Ok(None);
        };

        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::internal("Claimed job vanished"))?;
        job.state = JobState::Claimed;
        job.claimed_by = Some(worker_id.to_string());
        job.claimed_at = Some(now);
        job.last_heartbeat = Some(now);
        job.attempt += 1;
        job.updated_at = now;

        debug!(job_id = %id, category, worker_id, attempt = job.attempt, "Job claimed");
        Ok(Some(job.clone()))
    }

    async fn start(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        let mut state = self.lock();
        let job = state.jobs.get_mut(&id);
        match job {
            Some(job) if owned_by(job, worker_id) && job.state == JobState::Claimed => {
                job.state = JobState::Running;
                job.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            ))),
        }
    }

    async fn heartbeat(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if owned_by(job, worker_id) => {
                job.last_heartbeat = Some(Utc::now());
                Ok(())
            }
            _ => Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            ))),
        }
    }

    async fn complete(
        &self,
        id: Uuid,
        worker_id: &str,
        result: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if owned_by(job, worker_id) => {
                job.state = JobState::Succeeded;
                job.result = result;
                clear_claim(job);
                job.updated_at = Utc::now();
                debug!(job_id = %id, "Job succeeded");
                Ok(())
            }
            _ => Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            ))),
        }
    }

    async fn fail(&self, id: Uuid, worker_id: &str, error: &str, retryable: bool) -> AppResult<()> {
        // Resolve the backoff outside the lock; the category is immutable.
        let snapshot = {
            let state = self.lock();
            match state.jobs.get(&id) {
                Some(job) if owned_by(job, worker_id) => job.clone(),
                _ => {
                    return Err(AppError::stale_claim(format!(
                        "Job {id} is not claimed by worker '{worker_id}'"
                    )));
                }
            }
        };
        let available_at = self.backoff_until(&snapshot)?;

        let mut state = self.lock();
        let job = match state.jobs.get_mut(&id) {
            Some(job) if owned_by(job, worker_id) => job,
            _ => {
                return Err(AppError::stale_claim(format!(
                    "Job {id} is not claimed by worker '{worker_id}'"
                )));
            }
        };

        if !retryable {
            job.state = JobState::Failed;
            job.error = Some(error.to_string());
            debug!(job_id = %id, error, "Job failed terminally");
        } else if job.attempt < job.max_attempts {
            job.state = JobState::Pending;
            job.available_at = available_at;
            debug!(
                job_id = %id,
                attempt = job.attempt,
                max_attempts = job.max_attempts,
                "Job requeued after retryable failure"
            );
        } else {
            job.state = JobState::Abandoned;
            job.error = Some(error.to_string());
            debug!(job_id = %id, attempt = job.attempt, "Job abandoned, attempts exhausted");
        }
        clear_claim(job);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn list_stale(&self, category: &str, older_than: DateTime<Utc>) -> AppResult<Vec<Job>> {
        let state = self.lock();
        let mut stale: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| {
                j.category == category
                    && j.state.is_claimed()
                    && j.last_heartbeat.is_none_or(|h| h < older_than)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|j| j.last_heartbeat);
        Ok(stale)
    }

    async fn requeue_or_abandon(&self, id: Uuid) -> AppResult<()> {
        let snapshot = {
            let state = self.lock();
            match state.jobs.get(&id) {
                Some(job) if job.state.is_claimed() => job.clone(),
                // Already recovered or terminal: nothing to do.
                _ => return Ok(()),
            }
        };

        let entry = self.registry.resolve(&snapshot.category)?;
        let cutoff = Utc::now()
            - ChronoDuration::from_std(entry.claim_timeout)
                .map_err(|e| AppError::internal(format!("Claim timeout out of range: {e}")))?;
        let available_at = self.backoff_until(&snapshot)?;

        let mut state = self.lock();
        let job = match state.jobs.get_mut(&id) {
            Some(job) if job.state.is_claimed() => job,
            _ => return Ok(()),
        };
        // Re-evaluate staleness: the worker may have heartbeated since.
        if job.last_heartbeat.is_some_and(|h| h >= cutoff) {
            return Ok(());
        }

        if job.attempt < job.max_attempts {
            job.state = JobState::Pending;
            job.available_at = available_at;
            debug!(job_id = %id, "Stale claim requeued");
        } else {
            job.state = JobState::Abandoned;
            job.error = Some(format!(
                "Claim expired without heartbeat on attempt {} of {}",
                job.attempt, job.max_attempts
            ));
            debug!(job_id = %id, "Stale claim abandoned, attempts exhausted");
        }
        clear_claim(job);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Job>> {
        Ok(self.lock().jobs.get(&id).cloned())
    }

    async fn list(
        &self,
        category: Option<&str>,
        state_filter: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Job>> {
        let state = self.lock();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| category.is_none_or(|c| j.category == c))
            .filter(|j| state_filter.is_none_or(|s| j.state == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let total = jobs.len() as u64;
        let items: Vec<Job> = jobs
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok(PageResponse::new(items, page.page, page.page_size, total))
    }

    async fn queue_stats(&self, category: &str) -> AppResult<QueueStats> {
        let now = Utc::now();
        let state = self.lock();
        let mut stats = QueueStats {
            category: category.to_string(),
            ..QueueStats::default()
        };
        let mut oldest: Option<DateTime<Utc>> = None;

        for job in state.jobs.values().filter(|j| j.category == category) {
            match job.state {
                JobState::Pending => {
                    stats.pending += 1;
                    if job.available_at <= now
                        && oldest.is_none_or(|current| job.submitted_at < current)
                    {
                        oldest = Some(job.submitted_at);
                    }
                }
                JobState::Claimed => stats.claimed += 1,
                JobState::Running => stats.running += 1,
                JobState::Succeeded => stats.succeeded += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Abandoned => stats.abandoned += 1,
            }
        }
        stats.oldest_pending_seconds = oldest.map(|t| (now - t).num_seconds());
        Ok(stats)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}
