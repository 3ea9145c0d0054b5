//! Category registry: execution constraints for each job category.
//!
//! The registry is built once at startup from configuration and passed by
//! `Arc` to every component that needs it (store, dispatchers, reaper,
//! health reporter). There is no process-global registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::worker::{CategoryConfig, RetryBackoffConfig, WorkerConfig};
use crate::error::AppError;
use crate::result::AppResult;

/// Retry backoff schedule: delay before a failed attempt becomes
/// claimable again, as a function of the attempt number (1-based).
#[derive(Debug, Clone, PartialEq)]
pub enum RetryBackoff {
    /// The same delay after every attempt.
    Fixed {
        /// Delay applied after each failed attempt.
        delay: Duration,
    },
    /// `base * 2^(attempt - 1)`, capped.
    Exponential {
        /// Delay after the first failed attempt.
        base: Duration,
        /// Upper bound on the computed delay.
        cap: Duration,
    },
}

impl RetryBackoff {
    /// Delay to apply after the given attempt number failed.
    pub fn delay_for(&self, attempt: i32) -> Duration {
        match self {
            Self::Fixed { delay } => *delay,
            Self::Exponential { base, cap } => {
                let shift = attempt.saturating_sub(1).clamp(0, 31) as u32;
                base.checked_mul(1u32 << shift).unwrap_or(*cap).min(*cap)
            }
        }
    }
}

impl From<&RetryBackoffConfig> for RetryBackoff {
    fn from(config: &RetryBackoffConfig) -> Self {
        match config.kind.as_str() {
            "fixed" => Self::Fixed {
                delay: Duration::from_secs(config.base_seconds),
            },
            _ => Self::Exponential {
                base: Duration::from_secs(config.base_seconds),
                cap: Duration::from_secs(config.cap_seconds),
            },
        }
    }
}

/// Execution constraints for one job category.
///
/// Registered once at process start; read-only afterwards.
#[derive(Debug, Clone)]
pub struct CategoryEntry {
    /// Category name.
    pub name: String,
    /// Upper bound on simultaneously running jobs in this category.
    pub max_concurrency: usize,
    /// Maximum number of claims a job in this category may consume.
    pub attempt_limit: i32,
    /// Delay schedule for retryable failures.
    pub retry_backoff: RetryBackoff,
    /// Heartbeat staleness threshold after which a claim is reclaimable.
    pub claim_timeout: Duration,
}

impl CategoryEntry {
    /// Interval at which workers holding a claim must heartbeat.
    ///
    /// A third of the claim timeout, so one missed heartbeat does not
    /// trigger false reclamation.
    pub fn heartbeat_interval(&self) -> Duration {
        self.claim_timeout / 3
    }
}

impl TryFrom<&CategoryConfig> for CategoryEntry {
    type Error = AppError;

    fn try_from(config: &CategoryConfig) -> AppResult<Self> {
        if config.name.is_empty() {
            return Err(AppError::configuration("Category name must not be empty"));
        }
        if config.max_concurrency == 0 {
            return Err(AppError::configuration(format!(
                "Category '{}': max_concurrency must be at least 1",
                config.name
            )));
        }
        if config.attempt_limit < 1 {
            return Err(AppError::configuration(format!(
                "Category '{}': attempt_limit must be at least 1",
                config.name
            )));
        }
        if config.claim_timeout_seconds == 0 {
            return Err(AppError::configuration(format!(
                "Category '{}': claim_timeout_seconds must be at least 1",
                config.name
            )));
        }

        Ok(Self {
            name: config.name.clone(),
            max_concurrency: config.max_concurrency,
            attempt_limit: config.attempt_limit,
            retry_backoff: RetryBackoff::from(&config.retry_backoff),
            claim_timeout: Duration::from_secs(config.claim_timeout_seconds),
        })
    }
}

/// Static lookup table from category name to execution constraints.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    entries: HashMap<String, Arc<CategoryEntry>>,
}

impl CategoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from worker configuration.
    ///
    /// Fails with `DuplicateCategory` on repeated names and with
    /// `Configuration` on invalid constraint values.
    pub fn from_config(config: &WorkerConfig) -> AppResult<Self> {
        let mut registry = Self::new();
        for category in &config.categories {
            registry.register(CategoryEntry::try_from(category)?)?;
        }
        Ok(registry)
    }

    /// Register a category entry.
    pub fn register(&mut self, entry: CategoryEntry) -> AppResult<()> {
        if self.entries.contains_key(&entry.name) {
            return Err(AppError::duplicate_category(&entry.name));
        }

        info!(
            category = %entry.name,
            max_concurrency = entry.max_concurrency,
            attempt_limit = entry.attempt_limit,
            claim_timeout_secs = entry.claim_timeout.as_secs_f64(),
            "Registered job category"
        );
        self.entries.insert(entry.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Resolve a category by name.
    pub fn resolve(&self, category: &str) -> AppResult<Arc<CategoryEntry>> {
        self.entries
            .get(category)
            .cloned()
            .ok_or_else(|| AppError::unknown_category(category))
    }

    /// Whether a category is registered.
    pub fn contains(&self, category: &str) -> bool {
        self.entries.contains_key(category)
    }

    /// All registered entries.
    pub fn categories(&self) -> Vec<Arc<CategoryEntry>> {
        self.entries.values().cloned().collect()
    }

    /// Number of registered categories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
