//! Job state enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use jobhub_core::error::AppError;

/// State of a background job.
///
/// Transitions are monotone along
/// `pending → claimed → running → {succeeded | failed | abandoned}`,
/// with a retryable failure or a reaped claim moving the job back to
/// `pending`. No transition skips `claimed` except submission itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Exclusively assigned to a worker, not yet executing.
    Claimed,
    /// Currently being executed by a worker.
    Running,
    /// Completed successfully; `result` is set.
    Succeeded,
    /// The handler reported a terminal failure; `error` is set.
    Failed,
    /// Retryable failures exhausted the attempt budget.
    Abandoned,
}

impl JobState {
    /// Whether the job has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Abandoned)
    }

    /// Whether a worker currently owns the job.
    pub fn is_claimed(&self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobState {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(AppError::validation(format!("Unknown job state: '{other}'"))),
        }
    }
}
