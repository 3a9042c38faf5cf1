//! Execution layer - synchronization jobs, exclusive regions, and the job
//! manager that runs them.

#![warn(missing_docs)]

pub mod region;
pub mod config;
pub mod error;
pub mod job;
pub mod sync_job;
pub mod manager;

pub use region::{ExclusiveRegion, RegionGuard, RegionError, ResourceKey};
pub use config::{JobConfig, PhaseWeights};
pub use error::JobError;
pub use job::{Job, JobOutcome, JobState};
pub use sync_job::{JobServices, SynchronizationJob};
pub use manager::{InMemoryJobManager, JobFilter, JobManager, JobStatusResponse, ManagerError};
