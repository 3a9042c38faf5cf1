//! Progress observers.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A progress update, expressed at the root of the scope tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// Root task name
    pub task: String,

    /// Latest detail line from anywhere in the tree
    pub detail: Option<String>,

    /// Root units completed (never decreases)
    pub completed: f64,

    /// Root unit budget
    pub total: u32,

    /// Set on the single event emitted when the root completes
    pub done: bool,
}

impl ProgressEvent {
    /// Completion as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        if self.done {
            return 100;
        }
        if self.total == 0 {
            return 0;
        }
        ((self.completed / self.total as f64) * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}

/// Receives progress events from a scope tree.
pub trait ProgressObserver: Send + Sync {
    /// Called after every visible change.
    fn on_progress(&self, event: &ProgressEvent);
}

/// Observer that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        debug!(
            task = %event.task,
            detail = event.detail.as_deref().unwrap_or(""),
            percent = event.percent(),
            done = event.done,
            "progress"
        );
    }
}

/// Observer that keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingObserver {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Most recent event.
    pub fn last(&self) -> Option<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// How many completion events were seen.
    pub fn done_count(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.done)
            .count()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(completed: f64, total: u32, done: bool) -> ProgressEvent {
        ProgressEvent {
            task: "sync".to_string(),
            detail: None,
            completed,
            total,
            done,
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!(event(0.0, 0, false).percent(), 0);
        assert_eq!(event(39.9, 100, false).percent(), 39);
        assert_eq!(event(12.0, 100, true).percent(), 100);
    }

    #[test]
    fn test_recording_observer_counts_done() {
        let recorder = RecordingObserver::new();
        recorder.on_progress(&event(10.0, 100, false));
        recorder.on_progress(&event(100.0, 100, true));
        assert_eq!(recorder.events().len(), 2);
        assert_eq!(recorder.done_count(), 1);
        assert!(recorder.last().unwrap().done);
    }
}
