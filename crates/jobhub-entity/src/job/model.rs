//! Job record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::state::JobState;

/// A background job record.
///
/// The single source of truth for a job lives in the job store; workers
/// only ever see snapshots of it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier, assigned at submission.
    pub id: Uuid,
    /// Category identifying the registry entry and queue.
    pub category: String,
    /// Opaque payload, meaningful only to the category's handler.
    pub payload: serde_json::Value,
    /// Result data, set exactly once on success.
    pub result: Option<serde_json::Value>,
    /// Error message, set exactly once on `failed` or `abandoned`.
    pub error: Option<String>,
    /// Current job state.
    pub state: JobState,
    /// Number of claims consumed, starting at 0.
    pub attempt: i32,
    /// Attempt budget, copied from the category registry at submission.
    pub max_attempts: i32,
    /// Identity of the worker holding the claim.
    pub claimed_by: Option<String>,
    /// When the current claim was taken.
    pub claimed_at: Option<DateTime<Utc>>,
    /// Last liveness signal from the claiming worker.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Earliest time the job may be claimed.
    pub available_at: DateTime<Utc>,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether the attempt budget allows another claim.
    pub fn attempts_remaining(&self) -> bool {
        self.attempt < self.max_attempts
    }
}
