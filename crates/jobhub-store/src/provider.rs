//! Store manager that dispatches to the configured provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use jobhub_core::config::store::StoreConfig;
use jobhub_core::error::AppError;
use jobhub_core::registry::CategoryRegistry;
use jobhub_core::result::AppResult;
use jobhub_core::types::pagination::{PageRequest, PageResponse};
use jobhub_entity::job::{Job, JobState};

use crate::memory::MemoryJobStore;
use crate::postgres::PostgresJobStore;
use crate::store::{JobStore, QueueStats};
use crate::{connection, migration};

/// Job store manager that wraps the configured provider.
///
/// The provider is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// The inner job store provider.
    inner: Arc<dyn JobStore>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    ///
    /// The `postgres` provider connects a pool and runs pending
    /// migrations before serving.
    pub async fn new(config: &StoreConfig, registry: Arc<CategoryRegistry>) -> AppResult<Self> {
        let inner: Arc<dyn JobStore> = match config.provider.as_str() {
            "postgres" => {
                info!("Initializing PostgreSQL job store");
                let pool = connection::create_pool(&config.database).await?;
                migration::run_migrations(&pool).await?;
                Arc::new(PostgresJobStore::new(pool, registry))
            }
            "memory" => {
                info!("Initializing in-memory job store");
                Arc::new(MemoryJobStore::new(registry))
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store provider: '{other}'. Supported: postgres, memory"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing provider (for testing).
    pub fn from_store(store: Arc<dyn JobStore>) -> Self {
        Self { inner: store }
    }

    /// Get a reference to the inner provider.
    pub fn store(&self) -> &dyn JobStore {
        self.inner.as_ref()
    }
}

#[async_trait]
impl JobStore for StoreManager {
    async fn submit(&self, category: &str, payload: serde_json::Value) -> AppResult<Job> {
        self.inner.submit(category, payload).await
    }

    async fn claim_next(&self, category: &str, worker_id: &str) -> AppResult<Option<Job>> {
        self.inner.claim_next(category, worker_id).await
    }

    async fn start(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        self.inner.start(id, worker_id).await
    }

    async fn heartbeat(&self, id: Uuid, worker_id: &str) -> AppResult<()> {
        self.inner.heartbeat(id, worker_id).await
    }

    async fn complete(
        &self,
        id: Uuid,
        worker_id: &str,
        result: Option<serde_json::Value>,
    ) -> AppResult<()> {
        self.inner.complete(id, worker_id, result).await
    }

    async fn fail(&self, id: Uuid, worker_id: &str, error: &str, retryable: bool) -> AppResult<()> {
        self.inner.fail(id, worker_id, error, retryable).await
    }

    async fn list_stale(&self, category: &str, older_than: DateTime<Utc>) -> AppResult<Vec<Job>> {
        self.inner.list_stale(category, older_than).await
    }

    async fn requeue_or_abandon(&self, id: Uuid) -> AppResult<()> {
        self.inner.requeue_or_abandon(id).await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Job>> {
        self.inner.get(id).await
    }

    async fn list(
        &self,
        category: Option<&str>,
        state: Option<JobState>,
        page: &PageRequest,
    ) -> AppResult<PageResponse<Job>> {
        self.inner.list(category, state, page).await
    }

    async fn queue_stats(&self, category: &str) -> AppResult<QueueStats> {
        self.inner.queue_stats(category).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}
