//! Errors raised by job inputs and job collaborators.

use std::path::PathBuf;

/// Invalid job construction arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Project directory was empty
    #[error("project directory must not be empty")]
    EmptyProjectDir,

    /// Project directory was not absolute
    #[error("project directory must be absolute: {0}")]
    RelativeProjectDir(PathBuf),

    /// Any other invalid argument
    #[error("{0}")]
    Invalid(String),
}

/// Failure of the opaque initializer step.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    /// The initializer observed cancellation
    #[error("initialization cancelled")]
    Cancelled,

    /// The initializer failed
    #[error("initialization failed: {0}")]
    Failed(String),

    /// Other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InitializationError {
    /// Whether this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InitializationError::Cancelled)
    }
}

/// Failure of a model fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The fetch observed cancellation
    #[error("model fetch cancelled")]
    Cancelled,

    /// A cache-only fetch found nothing cached
    #[error("no cached model for {0}")]
    NotCached(PathBuf),

    /// The model could not be computed
    #[error("failed to load model for {project_dir}: {message}")]
    Load {
        /// Project root the model was requested for
        project_dir: PathBuf,
        /// What went wrong
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// Whether this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }
}

/// Failure while reconciling a model into the workspace.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The synchronization observed cancellation
    #[error("synchronization cancelled")]
    Cancelled,

    /// The model conflicts with existing workspace state
    #[error("workspace conflict: {0}")]
    Conflict(String),

    /// Other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Whether this error only reports cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
