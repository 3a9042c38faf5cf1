//! Job abstraction shared by every schedulable unit of work.

use async_trait::async_trait;
use buildsync_core::JobFamily;
use buildsync_progress::ProgressScope;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// How a job that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// All phases ran
    Completed,
    /// Cancellation was observed and cleanup finished
    Cancelled,
}

/// Job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Constructed, not yet run
    Created,
    /// Currently running
    Running,
    /// Completed successfully
    Completed,
    /// Cancelled by request
    Cancelled,
    /// Failed with an error
    Failed,
}

impl JobState {
    /// Whether the state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed
        )
    }

    /// Terminal state for a run result.
    pub fn from_result(result: &Result<JobOutcome, JobError>) -> Self {
        match result {
            Ok(JobOutcome::Completed) => JobState::Completed,
            Ok(JobOutcome::Cancelled) => JobState::Cancelled,
            Err(_) => JobState::Failed,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "created"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Cancelled => write!(f, "cancelled"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// A named, cancellable unit of work.
#[async_trait]
pub trait Job: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Classification used for bulk lookup and cancellation.
    fn family(&self) -> JobFamily;

    /// Whether the job belongs to `family`.
    fn belongs_to(&self, family: &JobFamily) -> bool {
        self.family() == *family
    }

    /// Whether progress should be shown to the user rather than run silently.
    fn is_user(&self) -> bool {
        false
    }

    /// Current lifecycle state.
    fn state(&self) -> JobState;

    /// Run the job under `root`, observing `token`.
    ///
    /// The job completes the root scope's budget; the caller owns the scope.
    async fn run(
        &self,
        root: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<JobOutcome, JobError>;
}
