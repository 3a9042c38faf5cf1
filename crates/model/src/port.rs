//! Collaborator ports of the synchronization job.

use async_trait::async_trait;
use buildsync_core::{
    BuildModel, FetchError, FetchStrategy, InitializationError, ProjectIdentity, SyncError,
    WorkingSets,
};
use buildsync_progress::ProgressScope;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::context::TransientInvocationContext;

/// Source of build models.
#[async_trait]
pub trait ModelFetchPort: Send + Sync {
    /// Fetch the model for a project root.
    ///
    /// Implementations must honor the token carried by `ctx`.
    async fn fetch(
        &self,
        identity: &ProjectIdentity,
        ctx: TransientInvocationContext,
        strategy: FetchStrategy,
    ) -> Result<BuildModel, FetchError>;
}

/// Reconciles a fetched model into the workspace.
#[async_trait]
pub trait SynchronizationPort: Send + Sync {
    /// Apply `model` to the workspace, assigning synchronized projects to `tags`.
    async fn synchronize(
        &self,
        model: &BuildModel,
        identity: &ProjectIdentity,
        tags: &WorkingSets,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<SyncReport, SyncError>;
}

/// Opaque setup step run before anything touches the workspace.
#[async_trait]
pub trait Initializer: Send + Sync {
    /// Run the step.
    async fn run(
        &self,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<(), InitializationError>;
}

/// Initializer with nothing to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopInitializer;

#[async_trait]
impl Initializer for NoopInitializer {
    async fn run(
        &self,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<(), InitializationError> {
        if token.is_cancelled() {
            return Err(InitializationError::Cancelled);
        }
        scope.done();
        Ok(())
    }
}

/// What a synchronization changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Projects new to the workspace
    pub added: Vec<String>,

    /// Projects already present and refreshed
    pub updated: Vec<String>,

    /// Projects removed because the model no longer has them
    pub removed: Vec<String>,
}

impl SyncReport {
    /// Number of projects touched.
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
