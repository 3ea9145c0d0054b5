//! Shared application state threaded through all handlers.

use std::sync::Arc;

use jobhub_core::config::AppConfig;
use jobhub_core::registry::CategoryRegistry;
use jobhub_store::StoreManager;
use jobhub_worker::HealthReporter;

/// Application state for the HTTP API.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// The job store.
    pub store: Arc<StoreManager>,
    /// Registered job categories.
    pub registry: Arc<CategoryRegistry>,
    /// Pool health reporter.
    pub health: Arc<HealthReporter>,
}
