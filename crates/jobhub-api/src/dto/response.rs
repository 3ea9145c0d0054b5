//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jobhub_entity::job::{Job, JobState};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Job summary for responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    /// Job ID.
    pub id: Uuid,
    /// Category.
    pub category: String,
    /// Current state.
    pub state: JobState,
    /// Claims consumed so far.
    pub attempt: i32,
    /// Attempt budget.
    pub max_attempts: i32,
    /// Result data, present once succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error message, present once failed or abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Earliest time the job may be claimed.
    pub available_at: DateTime<Utc>,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            category: job.category,
            state: job.state,
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            result: job.result,
            error: job.error,
            available_at: job.available_at,
            submitted_at: job.submitted_at,
            updated_at: job.updated_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

/// Probe response for liveness/readiness endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    /// `"ok"` or `"unavailable"`.
    pub status: String,
}
