//! Request DTOs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use jobhub_entity::job::JobState;

/// Body for `POST /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitJobRequest {
    /// Job category.
    #[validate(length(min = 1, max = 128))]
    pub category: String,
    /// Opaque payload handed to the category's handler.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Query parameters for `GET /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by category.
    pub category: Option<String>,
    /// Filter by state.
    pub state: Option<JobState>,
    /// Page number (1-based).
    pub page: Option<u64>,
    /// Items per page.
    pub page_size: Option<u64>,
}
