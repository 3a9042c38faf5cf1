//! Force-reload-and-synchronize job for a project root.

use async_trait::async_trait;
use buildsync_core::{BuildModel, FetchStrategy, JobFamily, ProjectIdentity, WorkingSets};
use buildsync_model::{
    DelegatingProgressListener, Initializer, ModelFetchPort, NullStreamsProvider,
    ProcessStreamsProvider, SyncReport, SynchronizationPort, TransientInvocationContext,
};
use buildsync_progress::ProgressScope;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::JobConfig;
use crate::error::JobError;
use crate::job::{Job, JobOutcome, JobState};
use crate::region::{ExclusiveRegion, RegionError};

/// Collaborators shared by every synchronization job of a host.
#[derive(Clone)]
pub struct JobServices {
    /// Model source
    pub fetcher: Arc<dyn ModelFetchPort>,
    /// Workspace reconciler
    pub synchronizer: Arc<dyn SynchronizationPort>,
    /// Region guarding the workspace
    pub region: Arc<ExclusiveRegion>,
    /// Process streams for model builds
    pub streams: Arc<dyn ProcessStreamsProvider>,
}

impl JobServices {
    /// Create services that discard build output.
    pub fn new(
        fetcher: Arc<dyn ModelFetchPort>,
        synchronizer: Arc<dyn SynchronizationPort>,
        region: Arc<ExclusiveRegion>,
    ) -> Self {
        Self {
            fetcher,
            synchronizer,
            region,
            streams: Arc::new(NullStreamsProvider),
        }
    }

    /// Set the process streams provider.
    pub fn with_streams(mut self, streams: Arc<dyn ProcessStreamsProvider>) -> Self {
        self.streams = streams;
        self
    }
}

/// Forces a reload of a project's build model and synchronizes it with the
/// workspace.
///
/// Runs three phases under one root scope: the initializer, the forced
/// fetch and the synchronization. The workspace region is taken after the
/// initializer and held until the synchronization ends, so no other job sees
/// a half-synchronized workspace. It is released on every path.
pub struct SynchronizationJob {
    name: String,
    identity: ProjectIdentity,
    tags: WorkingSets,
    initializer: Arc<dyn Initializer>,
    services: JobServices,
    config: JobConfig,
    state: Mutex<JobState>,
    report: Mutex<Option<SyncReport>>,
}

impl SynchronizationJob {
    /// Create a job. Nothing is acquired until [`Job::run`].
    ///
    /// The working-set names are copied as given.
    pub fn new<I, S>(
        identity: ProjectIdentity,
        working_sets: I,
        initializer: Arc<dyn Initializer>,
        services: JobServices,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags = WorkingSets::new(working_sets);
        let name = format!("Reload root project at {}", identity.project_dir().display());

        Self {
            name,
            identity,
            tags,
            initializer,
            services,
            config: JobConfig::default(),
            state: Mutex::new(JobState::Created),
            report: Mutex::new(None),
        }
    }

    /// Override the default configuration.
    pub fn with_config(mut self, config: JobConfig) -> Result<Self, JobError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Stable family tag string, for hosts that match families by name.
    pub fn family_tag() -> &'static str {
        JobFamily::ProjectRefresh.as_str()
    }

    /// Project the job refreshes.
    pub fn identity(&self) -> &ProjectIdentity {
        &self.identity
    }

    /// Working sets synchronized projects join.
    pub fn working_sets(&self) -> &WorkingSets {
        &self.tags
    }

    /// What the last successful synchronization changed.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, state: JobState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn start(&self) -> Result<(), JobError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != JobState::Created {
            return Err(JobError::AlreadyStarted(self.name.clone()));
        }
        *state = JobState::Running;
        Ok(())
    }

    async fn execute(
        &self,
        root: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        let weights = self.config.weights;
        root.begin("Synchronize project with workspace", weights.total());

        if token.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        {
            let scope = root.child(weights.initialize)?;
            match self.initializer.run(&scope, token).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() || token.is_cancelled() => {
                    return Ok(JobOutcome::Cancelled);
                }
                Err(source) => {
                    return Err(JobError::Initialization {
                        job: self.name.clone(),
                        source,
                    });
                }
            }
            scope.done();
        }

        if token.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        // Other workspace mutations serialize on the same key. Holding it for
        // both remaining phases keeps them from seeing a partial import.
        let mut guard = {
            let scope = root.child(weights.wait)?;
            let region = &self.services.region;
            match region.acquire(&self.config.region_key, &scope, token).await {
                Ok(guard) => guard,
                Err(RegionError::Cancelled(_)) => return Ok(JobOutcome::Cancelled),
            }
        };
        debug!("Holding {} for {}", guard.key(), self.name);

        let outcome = self.refresh(root, token).await;
        guard.release();
        outcome
    }

    async fn refresh(
        &self,
        root: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        let weights = self.config.weights;

        if token.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        let model = {
            let scope = root.child(weights.fetch)?;
            let fetched = self.force_reload(&scope, token).await;
            scope.done();
            match fetched {
                Ok(model) => model,
                Err(e) if e.is_cancelled() || token.is_cancelled() => {
                    return Ok(JobOutcome::Cancelled);
                }
                Err(source) => {
                    error!("Force reload of {} failed: {}", self.identity, source);
                    return Err(JobError::Fetch {
                        project_dir: self.identity.project_dir().to_path_buf(),
                        source,
                    });
                }
            }
        };

        if token.is_cancelled() {
            return Ok(JobOutcome::Cancelled);
        }

        let scope = root.child(weights.synchronize)?;
        let synchronized = self
            .services
            .synchronizer
            .synchronize(&model, &self.identity, &self.tags, &scope, token)
            .await;
        scope.done();

        match synchronized {
            Ok(report) => {
                *self.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
                if token.is_cancelled() {
                    return Ok(JobOutcome::Cancelled);
                }
                Ok(JobOutcome::Completed)
            }
            Err(e) if e.is_cancelled() || token.is_cancelled() => Ok(JobOutcome::Cancelled),
            Err(source) => {
                error!("Synchronizing {} failed: {}", self.identity, source);
                Err(JobError::Sync {
                    project_dir: self.identity.project_dir().to_path_buf(),
                    source,
                })
            }
        }
    }

    async fn force_reload(
        &self,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<BuildModel, buildsync_core::FetchError> {
        scope.report_indeterminate(format!(
            "Force reload of project located at {}",
            self.identity.project_dir().display()
        ));

        let ctx = TransientInvocationContext::new(
            self.services.streams.background_job_streams(),
            token.clone(),
        )
        .with_progress_listener(Arc::new(DelegatingProgressListener::new(scope)));

        self.services
            .fetcher
            .fetch(&self.identity, ctx, FetchStrategy::ForceReload)
            .await
    }
}

#[async_trait]
impl Job for SynchronizationJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> JobFamily {
        JobFamily::ProjectRefresh
    }

    fn is_user(&self) -> bool {
        // The user is working in the workspace this job mutates.
        true
    }

    fn state(&self) -> JobState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        &self,
        root: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<JobOutcome, JobError> {
        self.start()?;
        info!("Starting job: {}", self.name);

        let result = self.execute(root, token).await;
        root.done();

        let state = JobState::from_result(&result);
        self.set_state(state);
        match &result {
            Ok(JobOutcome::Completed) => info!("Job completed: {}", self.name),
            Ok(JobOutcome::Cancelled) => info!("Job cancelled: {}", self.name),
            Err(e) => warn!("Job failed in {} phase: {}: {}", e.phase(), self.name, e),
        }

        result
    }
}
