//! Job errors.

use buildsync_core::{FetchError, InitializationError, SyncError, ValidationError};
use buildsync_progress::OverBudgetError;
use std::path::PathBuf;

/// Why a job failed.
///
/// Cancellation is not an error; it is reported as
/// [`JobOutcome::Cancelled`](crate::JobOutcome::Cancelled).
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Bad construction arguments
    #[error("invalid job: {0}")]
    Validation(#[from] ValidationError),

    /// The initializer failed; nothing was locked
    #[error("initializing '{job}' failed: {source}")]
    Initialization {
        /// Job name
        job: String,
        /// Underlying error
        source: InitializationError,
    },

    /// Forced reload of the model failed
    #[error("force reload of {} failed: {source}", .project_dir.display())]
    Fetch {
        /// Project root
        project_dir: PathBuf,
        /// Underlying error
        source: FetchError,
    },

    /// Reconciling the model into the workspace failed
    #[error("synchronizing {} with the workspace failed: {source}", .project_dir.display())]
    Sync {
        /// Project root
        project_dir: PathBuf,
        /// Underlying error
        source: SyncError,
    },

    /// Phase weights did not fit the root budget
    #[error("progress budget exceeded: {0}")]
    Progress(#[from] OverBudgetError),

    /// The job instance already ran
    #[error("job '{0}' was already started")]
    AlreadyStarted(String),
}

impl JobError {
    /// Short name of the failing phase.
    pub fn phase(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::Initialization { .. } => "initialize",
            JobError::Fetch { .. } => "fetch",
            JobError::Sync { .. } => "synchronize",
            JobError::Progress(_) => "progress",
            JobError::AlreadyStarted(_) => "start",
        }
    }
}
