//! Job manager for background job execution.
//!
//! Schedules jobs onto the tokio runtime, gives each one its own
//! cancellation token and root progress scope, and answers status, family
//! and cancellation queries.

use async_trait::async_trait;
use buildsync_core::{JobFamily, JobId, Time};
use buildsync_progress::{LoggingObserver, ProgressEvent, ProgressObserver, ProgressScope};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::job::{Job, JobState};

/// Manager-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManagerError {
    /// No job with this ID was scheduled
    #[error("job {0} not found")]
    NotFound(JobId),

    /// The job already finished
    #[error("cannot cancel job {job_id} in {state} state")]
    NotCancellable {
        /// Job ID
        job_id: JobId,
        /// State the job ended in
        state: JobState,
    },
}

/// Snapshot of a scheduled job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job ID
    pub job_id: JobId,
    /// Job name
    pub name: String,
    /// Job family
    pub family: JobFamily,
    /// Lifecycle state
    pub state: JobState,
    /// Whether progress is shown to the user
    pub is_user: bool,
    /// Progress (0-100)
    pub progress: u8,
    /// Latest progress message
    pub progress_message: String,
    /// Whether cancellation was requested
    pub cancel_requested: bool,
    /// Scheduled timestamp
    pub created_at: Time,
    /// Started timestamp
    pub started_at: Option<Time>,
    /// Finished timestamp
    pub completed_at: Option<Time>,
    /// Error message (if failed)
    pub error: Option<String>,
}

/// Filter for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Filter by state
    pub state: Option<JobState>,
    /// Filter by family
    pub family: Option<JobFamily>,
    /// Maximum results to return
    pub limit: Option<usize>,
    /// Include finished jobs
    pub include_finished: bool,
}

impl JobFilter {
    fn matches(&self, record: &JobRecord) -> bool {
        let state = record.state();
        if let Some(wanted) = self.state {
            if state != wanted {
                return false;
            }
        }
        if let Some(family) = &self.family {
            if !record.job.belongs_to(family) {
                return false;
            }
        }
        self.include_finished || !state.is_terminal()
    }
}

/// Runs jobs and tracks them by ID and family.
#[async_trait]
pub trait JobManager: Send + Sync {
    /// Start a job in the background.
    async fn schedule(&self, job: Arc<dyn Job>) -> JobId;

    /// Current status of a job.
    async fn status(&self, job_id: &JobId) -> Option<JobStatusResponse>;

    /// Request cancellation. The job reports [`JobState::Cancelled`] once it
    /// has cleaned up.
    async fn cancel(&self, job_id: &JobId) -> Result<(), ManagerError>;

    /// Unfinished jobs belonging to `family`.
    async fn jobs_with_family(&self, family: &JobFamily) -> Vec<JobId>;

    /// Request cancellation of every unfinished job in `family`.
    ///
    /// Returns how many jobs were signalled.
    async fn cancel_family(&self, family: &JobFamily) -> usize;

    /// List jobs matching `filter`, oldest first.
    async fn list(&self, filter: JobFilter) -> Vec<JobStatusResponse>;

    /// Wait until the job finishes or `timeout` elapses, then report its
    /// status.
    async fn wait_for_completion(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> Option<JobStatusResponse>;
}

/// Latest root progress of one job.
#[derive(Debug, Default)]
struct ProgressCell {
    percent: AtomicU8,
    message: std::sync::Mutex<String>,
}

impl ProgressCell {
    fn message(&self) -> String {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressObserver for ProgressCell {
    fn on_progress(&self, event: &ProgressEvent) {
        self.percent.fetch_max(event.percent(), Ordering::SeqCst);
        let message = event.detail.as_deref().unwrap_or(&event.task);
        if !message.is_empty() {
            *self.message.lock().unwrap_or_else(PoisonError::into_inner) = message.to_string();
        }
    }
}

struct JobRecord {
    id: JobId,
    job: Arc<dyn Job>,
    token: CancellationToken,
    state: watch::Sender<JobState>,
    progress: Arc<ProgressCell>,
    created_at: Time,
    started_at: Option<Time>,
    completed_at: Option<Time>,
    error: Option<String>,
}

impl JobRecord {
    fn state(&self) -> JobState {
        *self.state.borrow()
    }

    fn response(&self) -> JobStatusResponse {
        JobStatusResponse {
            job_id: self.id.clone(),
            name: self.job.name().to_string(),
            family: self.job.family(),
            state: self.state(),
            is_user: self.job.is_user(),
            progress: self.progress.percent.load(Ordering::SeqCst),
            progress_message: self.progress.message(),
            cancel_requested: self.token.is_cancelled(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }
}

/// In-memory job manager implementation.
pub struct InMemoryJobManager {
    jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl InMemoryJobManager {
    /// Create a manager with no extra progress observers.
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(Mutex::new(HashMap::new())),
            observers: Vec::new(),
        }
    }

    /// Also send every job's progress to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Drop finished jobs. Returns how many were removed.
    pub async fn forget_finished(&self) -> usize {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, record| !record.state().is_terminal());
        before - jobs.len()
    }

    async fn run_job(
        jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
        job_id: JobId,
        job: Arc<dyn Job>,
        root: ProgressScope,
        token: CancellationToken,
    ) {
        if let Some(record) = jobs.lock().await.get_mut(&job_id) {
            record.started_at = Some(chrono::Utc::now());
            record.state.send_replace(JobState::Running);
        }

        // The job runs in its own task so a panic surfaces as a JoinError
        // instead of leaving the record Running.
        let handle = tokio::spawn(async move { job.run(&root, &token).await });
        let (state, error) = match handle.await {
            Ok(result) => {
                let state = JobState::from_result(&result);
                (state, result.err().map(|e| e.to_string()))
            }
            Err(e) => (JobState::Failed, Some(join_failure(e))),
        };

        let mut jobs = jobs.lock().await;
        if let Some(record) = jobs.get_mut(&job_id) {
            record.completed_at = Some(chrono::Utc::now());
            record.error = error.clone();
            record.state.send_replace(state);
        }

        match error {
            None => info!("Job {} finished: {}", job_id, state),
            Some(e) => warn!("Job {} failed: {}", job_id, e),
        }
    }
}

fn join_failure(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return format!("job aborted: {}", err);
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("job panicked: {}", message)
}

impl Default for InMemoryJobManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobManager for InMemoryJobManager {
    async fn schedule(&self, job: Arc<dyn Job>) -> JobId {
        let job_id = JobId::new();
        let token = CancellationToken::new();
        let progress = Arc::new(ProgressCell::default());

        let mut observers: Vec<Arc<dyn ProgressObserver>> = vec![
            Arc::clone(&progress) as Arc<dyn ProgressObserver>,
            Arc::new(LoggingObserver),
        ];
        observers.extend(self.observers.iter().cloned());
        let root = ProgressScope::root(observers);

        let (state, _) = watch::channel(JobState::Created);
        let record = JobRecord {
            id: job_id.clone(),
            job: Arc::clone(&job),
            token: token.clone(),
            state,
            progress,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        };
        self.jobs.lock().await.insert(job_id.clone(), record);

        debug!("Scheduled job {}: {}", job_id, job.name());
        tokio::spawn(Self::run_job(
            Arc::clone(&self.jobs),
            job_id.clone(),
            job,
            root,
            token,
        ));

        job_id
    }

    async fn status(&self, job_id: &JobId) -> Option<JobStatusResponse> {
        let jobs = self.jobs.lock().await;
        jobs.get(job_id).map(JobRecord::response)
    }

    async fn cancel(&self, job_id: &JobId) -> Result<(), ManagerError> {
        let jobs = self.jobs.lock().await;
        let record = jobs
            .get(job_id)
            .ok_or_else(|| ManagerError::NotFound(job_id.clone()))?;

        let state = record.state();
        if state.is_terminal() {
            return Err(ManagerError::NotCancellable {
                job_id: job_id.clone(),
                state,
            });
        }

        record.token.cancel();
        info!("Cancellation requested for job {}", job_id);
        Ok(())
    }

    async fn jobs_with_family(&self, family: &JobFamily) -> Vec<JobId> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<_> = jobs
            .values()
            .filter(|r| r.job.belongs_to(family) && !r.state().is_terminal())
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching.into_iter().map(|r| r.id.clone()).collect()
    }

    async fn cancel_family(&self, family: &JobFamily) -> usize {
        let jobs = self.jobs.lock().await;
        let mut count = 0;
        for record in jobs.values() {
            if record.job.belongs_to(family) && !record.state().is_terminal() {
                record.token.cancel();
                count += 1;
            }
        }
        if count > 0 {
            info!("Cancellation requested for {} job(s) in {}", count, family);
        }
        count
    }

    async fn list(&self, filter: JobFilter) -> Vec<JobStatusResponse> {
        let jobs = self.jobs.lock().await;
        let mut records: Vec<_> = jobs.values().filter(|r| filter.matches(r)).collect();
        records.sort_by_key(|r| r.created_at);

        let mut results: Vec<_> = records.into_iter().map(JobRecord::response).collect();
        if let Some(limit) = filter.limit {
            results.truncate(limit);
        }
        results
    }

    async fn wait_for_completion(
        &self,
        job_id: &JobId,
        timeout: Duration,
    ) -> Option<JobStatusResponse> {
        let mut rx = {
            let jobs = self.jobs.lock().await;
            jobs.get(job_id)?.state.subscribe()
        };

        // The borrow from wait_for must not live across the status lookup.
        let finished = tokio::time::timeout(timeout, rx.wait_for(JobState::is_terminal))
            .await
            .map(|r| r.is_ok());
        if finished.is_err() {
            debug!("Timed out waiting for job {}", job_id);
        }

        self.status(job_id).await
    }
}
