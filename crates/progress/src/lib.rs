//! Progress Reporting
//!
//! Weighted progress scopes with guaranteed single completion.

#![warn(missing_docs)]

pub mod scope;
pub mod observer;

pub use scope::{ProgressScope, ProgressHandle, OverBudgetError};
pub use observer::{ProgressObserver, ProgressEvent, LoggingObserver, RecordingObserver};
