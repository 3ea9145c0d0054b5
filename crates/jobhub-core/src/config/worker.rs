//! Worker pool and job category configuration.

use serde::{Deserialize, Serialize};

/// Background worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker tier is enabled in this process.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base interval in milliseconds between claim polls on an empty queue.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound in milliseconds on the idle poll backoff.
    #[serde(default = "default_idle_backoff_cap")]
    pub idle_backoff_cap_ms: u64,
    /// Backoff in milliseconds after a store-level error.
    #[serde(default = "default_store_error_backoff")]
    pub store_error_backoff_ms: u64,
    /// Interval in seconds between stale-claim reaper sweeps.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    /// Grace period in seconds for in-flight jobs during shutdown.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Registered job categories.
    #[serde(default)]
    pub categories: Vec<CategoryConfig>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: default_poll_interval(),
            idle_backoff_cap_ms: default_idle_backoff_cap(),
            store_error_backoff_ms: default_store_error_backoff(),
            reaper_interval_seconds: default_reaper_interval(),
            shutdown_grace_seconds: default_shutdown_grace(),
            categories: Vec::new(),
        }
    }
}

/// Execution constraints for one job category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Category name (e.g., `"export"`, `"webhooks"`).
    pub name: String,
    /// Maximum simultaneously running jobs for this category.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Maximum number of claims a job may consume.
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: i32,
    /// Heartbeat staleness threshold in seconds.
    #[serde(default = "default_claim_timeout")]
    pub claim_timeout_seconds: u64,
    /// Retry backoff schedule.
    #[serde(default)]
    pub retry_backoff: RetryBackoffConfig,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_concurrency: default_max_concurrency(),
            attempt_limit: default_attempt_limit(),
            claim_timeout_seconds: default_claim_timeout(),
            retry_backoff: RetryBackoffConfig::default(),
        }
    }
}

/// Retry backoff schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryBackoffConfig {
    /// Schedule kind: `"fixed"` or `"exponential"`.
    #[serde(default = "default_backoff_kind")]
    pub kind: String,
    /// Base delay in seconds.
    #[serde(default = "default_backoff_base")]
    pub base_seconds: u64,
    /// Upper bound in seconds for the exponential schedule.
    #[serde(default = "default_backoff_cap")]
    pub cap_seconds: u64,
}

impl Default for RetryBackoffConfig {
    fn default() -> Self {
        Self {
            kind: default_backoff_kind(),
            base_seconds: default_backoff_base(),
            cap_seconds: default_backoff_cap(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    500
}

fn default_idle_backoff_cap() -> u64 {
    10_000
}

fn default_store_error_backoff() -> u64 {
    2_000
}

fn default_reaper_interval() -> u64 {
    30
}

fn default_shutdown_grace() -> u64 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

fn default_attempt_limit() -> i32 {
    3
}

fn default_claim_timeout() -> u64 {
    60
}

fn default_backoff_kind() -> String {
    "exponential".to_string()
}

fn default_backoff_base() -> u64 {
    5
}

fn default_backoff_cap() -> u64 {
    300
}
