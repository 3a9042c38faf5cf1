//! buildsync core data models.
//!
//! This crate defines the identity, tagging and model types shared by the
//! synchronization job and its collaborators.

#![warn(missing_docs)]

// Identities
mod id;
mod identity;
mod family;

// Synchronization inputs
mod tags;
mod model;

// Collaborator errors
mod error;

// Re-exports
pub use id::JobId;
pub use identity::ProjectIdentity;
pub use family::JobFamily;
pub use tags::WorkingSets;
pub use model::{BuildModel, FetchStrategy, ProjectModel};
pub use error::{FetchError, InitializationError, SyncError, ValidationError};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
