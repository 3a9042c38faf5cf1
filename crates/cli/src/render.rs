//! Terminal progress output.

use buildsync_progress::{ProgressEvent, ProgressObserver};
use std::sync::atomic::{AtomicU8, Ordering};

/// Prints a line to stderr whenever the rounded percentage changes.
#[derive(Debug, Default)]
pub struct StderrProgress {
    last_percent: AtomicU8,
}

impl StderrProgress {
    /// Create a renderer.
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn format_event(event: &ProgressEvent) -> String {
    match &event.detail {
        Some(detail) if !event.done => {
            format!("[{:>3}%] {}: {}", event.percent(), event.task, detail)
        }
        _ => format!("[{:>3}%] {}", event.percent(), event.task),
    }
}

impl ProgressObserver for StderrProgress {
    fn on_progress(&self, event: &ProgressEvent) {
        let percent = event.percent();
        let previous = self.last_percent.fetch_max(percent, Ordering::SeqCst);
        if percent > previous || event.done {
            eprintln!("{}", format_event(event));
        }
    }
}
