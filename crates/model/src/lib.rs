//! Build model access
//!
//! Collaborator ports of the synchronization job, the per-call invocation
//! context, and a caching model repository backed by a directory scanner.

#![warn(missing_docs)]

pub mod port;
pub mod context;
pub mod repository;
pub mod loader;

pub use port::{ModelFetchPort, SynchronizationPort, Initializer, NoopInitializer, SyncReport};
pub use context::{
    TransientInvocationContext, ProcessStreams, ProcessStreamsProvider, NullStreamsProvider,
    StdioStreamsProvider, ProgressListener, DelegatingProgressListener, EventListener, BuildEvent,
};
pub use repository::{CachingModelRepository, ModelLoader};
pub use loader::{DirectoryModelLoader, LoaderConfig};

pub use tokio_util::sync::CancellationToken;
