//! PostgreSQL job store.
//!
//! Claim arbitration uses `FOR UPDATE SKIP LOCKED`, so concurrent
//! dispatchers across processes never receive the same job. Every
//! ownership-checked transition carries a `claimed_by` guard; zero rows
//! affected means the claim was lost to the reaper.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use jobhub_core::error::{AppError, ErrorKind};
use jobhub_core::registry::CategoryRegistry;
use jobhub_core::result::AppResult;
use jobhub_core::types::pagination::{PageRequest, PageResponse};
use jobhub_entity::job::{Job, JobState};

use crate::store::{JobStore, QueueStats};

/// Job store backed by a PostgreSQL `jobs` table.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    registry: Arc<CategoryRegistry>,
}

impl PostgresJobStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool, registry: Arc<CategoryRegistry>) -> Self {
        Self { pool, registry }
    }

    fn backoff_until(&self, job: &Job) -> AppResult<DateTime<Utc>> {
        let entry = self.registry.resolve(&job.category)?;
        let delay = entry.retry_backoff.delay_for(job.attempt);
        let delay = ChronoDuration::from_std(delay)
            .map_err(|e| AppError::internal(format!("Backoff out of range: {e}")))?;
        Ok(Utc::now() + delay)
    }

    fn db_err(context: &str, e: sqlx::Error) -> AppError {
        AppError::with_source(ErrorKind::Database, format!("{context}: {e}"), e)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn submit(&self, category: &str, payload: serde_json::Value) -> AppResult<Job> {
        let entry = self.registry.resolve(category)?;

        let job = sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (id, category, payload, max_attempts) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(category)
        .bind(&payload)
        .bind(entry.attempt_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to submit job", e))?;

        debug!(job_id = %job.id, category, "Job submitted");
        Ok(job)
    }

    async fn claim_next(&self, category: &str, worker_id: &str) -> AppResult<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            "UPDATE jobs SET state = 'claimed', claimed_by = $2, claimed_at = NOW(), \
             last_heartbeat = NOW(), attempt = attempt + 1, updated_at = NOW() \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE category = $1 AND state = 'pending' AND available_at <= NOW() \
                ORDER BY submitted_at ASC, id ASC \
                FOR UPDATE SKIP LOCKED \
                LIMIT 1 \
             ) RETURNING *",
        )
        .bind(category)
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to claim job", e))?;

        if let Some(job) = &job {
            debug!(job_id = %job.id, category, worker_id, attempt = job.attempt, "Job claimed");
        }
        Ok(job)
    }

    async fn start(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'running', updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND state = 'claimed'",
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to start job", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            )));
        }
        Ok(())
    }

    async fn heartbeat(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET last_heartbeat = NOW(), updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND state IN ('claimed', 'running')",
        )
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to heartbeat job", e))?;

        if result.rows_affected() == 0 {
            return Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            )));
        }
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        worker_id: &str,
        result: Option<serde_json::Value>,
    ) -> AppResult<()> {
        let updated = sqlx::query(
            "UPDATE jobs SET state = 'succeeded', result = $3, claimed_by = NULL, \
             claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() \
             WHERE id = $1 AND claimed_by = $2 AND state IN ('claimed', 'running')",
        )
        .bind(id)
        .bind(worker_id)
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to complete job", e))?;

        if updated.rows_affected() == 0 {
            return Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            )));
        }
        debug!(job_id = %id, "Job succeeded");
        Ok(())
    }

    async fn fail(&self, id: Uuid, worker_id: &str, error: &str, retryable: bool) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::db_err("Failed to begin transaction", e))?;

        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs \
             WHERE id = $1 AND claimed_by = $2 AND state IN ('claimed', 'running') \
             FOR UPDATE",
        )
        .bind(id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::db_err("Failed to load job for failure", e))?;

        let Some(job) = job else {
            return Err(AppError::stale_claim(format!(
                "Job {id} is not claimed by worker '{worker_id}'"
            )));
        };

        if !retryable {
            sqlx::query(
                "UPDATE jobs SET state = 'failed', error = $2, claimed_by = NULL, \
                 claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to mark job failed", e))?;
            debug!(job_id = %id, error, "Job failed terminally");
        } else if job.attempt < job.max_attempts {
            let available_at = self.backoff_until(&job)?;
            sqlx::query(
                "UPDATE jobs SET state = 'pending', available_at = $2, claimed_by = NULL, \
                 claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(available_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to requeue job", e))?;
            debug!(
                job_id = %id,
                attempt = job.attempt,
                max_attempts = job.max_attempts,
                "Job requeued after retryable failure"
            );
        } else {
            sqlx::query(
                "UPDATE jobs SET state = 'abandoned', error = $2, claimed_by = NULL, \
                 claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to abandon job", e))?;
            debug!(job_id = %id, attempt = job.attempt, "Job abandoned, attempts exhausted");
        }

        tx.commit()
            .await
            .map_err(|e| Self::db_err("Failed to commit failure transition", e))
    }

    async fn list_stale(&self, category: &str, older_than: DateTime<Utc>) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs \
             WHERE category = $1 AND state IN ('claimed', 'running') AND last_heartbeat < $2 \
             ORDER BY last_heartbeat ASC",
        )
        .bind(category)
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list stale jobs", e))
    }

    async fn requeue_or_abandon(&self, id: Uuid) -> AppResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::db_err("Failed to begin transaction", e))?;

        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to load job for recovery", e))?;

        // Already recovered or terminal: nothing to do.
        let Some(job) = job else { return Ok(()) };
        if !job.state.is_claimed() {
            return Ok(());
        }

        // Re-evaluate staleness: the worker may have heartbeated since
        // the sweep listed this job.
        let entry = self.registry.resolve(&job.category)?;
        let cutoff = Utc::now()
            - ChronoDuration::from_std(entry.claim_timeout)
                .map_err(|e| AppError::internal(format!("Claim timeout out of range: {e}")))?;
        if job.last_heartbeat.is_some_and(|h| h >= cutoff) {
            return Ok(());
        }

        if job.attempt < job.max_attempts {
            let available_at = self.backoff_until(&job)?;
            sqlx::query(
                "UPDATE jobs SET state = 'pending', available_at = $2, claimed_by = NULL, \
                 claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(available_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to requeue stale job", e))?;
            debug!(job_id = %id, "Stale claim requeued");
        } else {
            sqlx::query(
                "UPDATE jobs SET state = 'abandoned', error = $2, claimed_by = NULL, \
                 claimed_at = NULL, last_heartbeat = NULL, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(format!(
                "Claim expired without heartbeat on attempt {} of {}",
                job.attempt, job.max_attempts
            ))
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::db_err("Failed to abandon stale job", e))?;
            debug!(job_id = %id, "Stale claim abandoned, attempts exhausted");
        }

        tx.commit()
            .await
            .map_err(|e| Self::db_err("Failed to commit recovery transition", e))
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Self::db_err("Failed to fetch job", e))
    }

    async fn list(
        &self,
        category: Option<&str>,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Job>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs \
             WHERE ($1::text IS NULL OR category = $1) AND ($2::job_state IS NULL OR state = $2)",
        )
        .bind(category)
        .bind(state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to count jobs", e))?;

        let jobs = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs \
             WHERE ($1::text IS NULL OR category = $1) AND ($2::job_state IS NULL OR state = $2) \
             ORDER BY submitted_at DESC LIMIT $3 OFFSET $4",
        )
        .bind(category)
        .bind(state)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to list jobs", e))?;

        Ok(PageResponse::new(
            jobs,
            page.page,
            page.page_size,
            total as u64,
        ))
    }

    async fn queue_stats(&self, category: &str) -> AppResult<QueueStats> {
        let counts: Vec<(JobState, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs WHERE category = $1 GROUP BY state")
                .bind(category)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Self::db_err("Failed to count jobs by state", e))?;

        let mut stats = QueueStats {
            category: category.to_string(),
            ..QueueStats::default()
        };
        for (state, count) in counts {
            match state {
                JobState::Pending => stats.pending = count,
                JobState::Claimed => stats.claimed = count,
                JobState::Running => stats.running = count,
                JobState::Succeeded => stats.succeeded = count,
                JobState::Failed => stats.failed = count,
                JobState::Abandoned => stats.abandoned = count,
            }
        }

        let oldest: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT MIN(submitted_at) FROM jobs \
             WHERE category = $1 AND state = 'pending' AND available_at <= NOW()",
        )
        .bind(category)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::db_err("Failed to find oldest pending job", e))?;

        stats.oldest_pending_seconds = oldest.map(|t| (Utc::now() - t).num_seconds());
        Ok(stats)
    }

    async fn health_check(&self) -> AppResult<bool> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| Self::db_err("Health check failed", e))
    }
}
