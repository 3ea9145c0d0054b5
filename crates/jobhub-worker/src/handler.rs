//! Job handler trait and per-category handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobhub_entity::job::Job;

/// Error from a handler invocation.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Transient failure; the job may be retried within its attempt budget.
    #[error("Retryable job failure: {0}")]
    Retryable(String),

    /// The job can never succeed; no further attempts regardless of budget.
    #[error("Terminal job failure: {0}")]
    Terminal(String),
}

/// Trait for job handler implementations.
///
/// Exactly one handler is registered per category. The cancellation token
/// fires when the claim is lost to the reaper or the process is shutting
/// down; handlers should stop promptly at safe points but are not
/// forcibly killed, so they must be idempotent with respect to a
/// re-executed job.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug {
    /// The job category this handler processes.
    fn category(&self) -> &str;

    /// Execute a job with the given payload.
    async fn run(&self, job: &Job, cancel: CancellationToken) -> Result<Option<Value>, JobError>;
}

/// Registry of handlers keyed by category name.
#[derive(Debug, Default)]
pub struct JobExecutor {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobExecutor {
    /// Create an empty executor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for its category.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let category = handler.category().to_string();
        info!(category = %category, "Registered job handler");
        self.handlers.insert(category, handler);
    }

    /// Get the handler for a category.
    pub fn get(&self, category: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(category).cloned()
    }

    /// Whether a handler is registered for a category.
    pub fn has_handler(&self, category: &str) -> bool {
        self.handlers.contains_key(category)
    }

    /// The categories with registered handlers.
    pub fn registered_categories(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}
