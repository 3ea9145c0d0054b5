//! # jobhub-worker
//!
//! Worker-pool orchestration for JobHub:
//! - A handler trait and per-category handler registry
//! - One dispatcher per category with a bounded admission gate
//! - A stale-claim reaper recovering jobs from crashed workers
//! - A pull-based health reporter for external orchestration

pub mod dispatcher;
pub mod handler;
pub mod health;
pub mod reaper;
pub mod runner;

pub use dispatcher::{Dispatcher, DispatcherSettings};
pub use handler::{JobError, JobExecutor, JobHandler};
pub use health::{CategoryHealth, HealthReporter, HealthTracker};
pub use reaper::StaleClaimReaper;
pub use runner::WorkerRunner;
