//! Transient invocation context for model fetches.

use buildsync_core::Time;
use buildsync_progress::{ProgressHandle, ProgressScope};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Output, error and input channels handed to a model build.
pub struct ProcessStreams {
    /// Standard output of the build
    pub output: Box<dyn Write + Send + Sync>,

    /// Standard error of the build
    pub error: Box<dyn Write + Send + Sync>,

    /// Standard input of the build
    pub input: Box<dyn Read + Send + Sync>,
}

impl ProcessStreams {
    /// Streams that discard output and provide no input.
    pub fn null() -> Self {
        Self {
            output: Box::new(std::io::sink()),
            error: Box::new(std::io::sink()),
            input: Box::new(std::io::empty()),
        }
    }
}

impl std::fmt::Debug for ProcessStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessStreams").finish_non_exhaustive()
    }
}

/// Supplies process streams for jobs.
pub trait ProcessStreamsProvider: Send + Sync {
    /// Streams for a job running in the background.
    fn background_job_streams(&self) -> ProcessStreams;
}

/// Provider that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStreamsProvider;

impl ProcessStreamsProvider for NullStreamsProvider {
    fn background_job_streams(&self) -> ProcessStreams {
        ProcessStreams::null()
    }
}

/// Provider that forwards build output to the process' stderr.
///
/// Stdout is kept free for command results.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioStreamsProvider;

impl ProcessStreamsProvider for StdioStreamsProvider {
    fn background_job_streams(&self) -> ProcessStreams {
        ProcessStreams {
            output: Box::new(std::io::stderr()),
            error: Box::new(std::io::stderr()),
            input: Box::new(std::io::empty()),
        }
    }
}

/// Coarse status callback of a model build.
pub trait ProgressListener: Send + Sync {
    /// The build moved on to `description`.
    fn status_changed(&self, description: &str);
}

/// Forwards build status descriptions to a progress scope's detail line.
pub struct DelegatingProgressListener {
    handle: ProgressHandle,
}

impl DelegatingProgressListener {
    /// Bind to a scope.
    pub fn new(scope: &ProgressScope) -> Self {
        Self {
            handle: scope.handle(),
        }
    }
}

impl ProgressListener for DelegatingProgressListener {
    fn status_changed(&self, description: &str) {
        self.handle.sub_task(description);
    }
}

/// Fine-grained build event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
    /// Human-readable description
    pub display_name: String,

    /// When it happened
    pub timestamp: Time,
}

impl BuildEvent {
    /// Create an event stamped now.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Fine-grained event callback of a model build.
pub trait EventListener: Send + Sync {
    /// Receive an event.
    fn on_event(&self, event: &BuildEvent);
}

/// Everything a single model fetch needs besides the project identity.
///
/// Built fresh for each call and owned by it.
pub struct TransientInvocationContext {
    /// Process channels
    pub streams: ProcessStreams,

    /// Coarse status listeners
    pub progress_listeners: Vec<Arc<dyn ProgressListener>>,

    /// Fine-grained event listeners
    pub event_listeners: Vec<Arc<dyn EventListener>>,

    /// Cancellation signal of the calling job
    pub token: CancellationToken,
}

impl TransientInvocationContext {
    /// Create a context with the given streams and token and no listeners.
    pub fn new(streams: ProcessStreams, token: CancellationToken) -> Self {
        Self {
            streams,
            progress_listeners: Vec::new(),
            event_listeners: Vec::new(),
            token,
        }
    }

    /// Add a status listener.
    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress_listeners.push(listener);
        self
    }

    /// Add an event listener.
    pub fn with_event_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.event_listeners.push(listener);
        self
    }

    /// Broadcast a status change to every progress listener.
    pub fn status(&self, description: &str) {
        for listener in &self.progress_listeners {
            listener.status_changed(description);
        }
    }

    /// Broadcast an event to every event listener.
    pub fn emit(&self, event: &BuildEvent) {
        for listener in &self.event_listeners {
            listener.on_event(event);
        }
    }

    /// Whether the calling job was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl std::fmt::Debug for TransientInvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientInvocationContext")
            .field("progress_listeners", &self.progress_listeners.len())
            .field("event_listeners", &self.event_listeners.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
