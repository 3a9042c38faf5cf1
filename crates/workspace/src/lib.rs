//! Workspace representation
//!
//! The in-memory workspace that synchronization jobs reconcile build models
//! into.

#![warn(missing_docs)]

pub mod workspace;
pub mod synchronizer;

pub use workspace::{Workspace, WorkspaceProject, SharedWorkspace};
pub use synchronizer::WorkspaceSynchronizer;
