//! Caching model repository.

use async_trait::async_trait;
use buildsync_core::{BuildModel, FetchError, FetchStrategy, ProjectIdentity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::context::TransientInvocationContext;
use crate::port::ModelFetchPort;

/// Computes a build model from source.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load the model for a project root.
    async fn load(
        &self,
        identity: &ProjectIdentity,
        ctx: &mut TransientInvocationContext,
    ) -> Result<BuildModel, FetchError>;
}

/// Model repository caching one model per project identity.
pub struct CachingModelRepository<L: ModelLoader> {
    loader: L,
    cache: RwLock<HashMap<ProjectIdentity, BuildModel>>,
    loads: AtomicU64,
}

impl<L: ModelLoader> CachingModelRepository<L> {
    /// Create a repository with an empty cache.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            cache: RwLock::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    /// Cached model for an identity, if any.
    pub async fn cached(&self, identity: &ProjectIdentity) -> Option<BuildModel> {
        self.cache.read().await.get(identity).cloned()
    }

    /// How many times the loader ran.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    async fn load_and_cache(
        &self,
        identity: &ProjectIdentity,
        mut ctx: TransientInvocationContext,
    ) -> Result<BuildModel, FetchError> {
        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        let model = match self.loader.load(identity, &mut ctx).await {
            Ok(model) => model,
            Err(e) => {
                warn!("Model load for {} failed: {}", identity, e);
                return Err(e);
            }
        };

        if ctx.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        info!(
            "Loaded model for {} ({} projects)",
            identity,
            model.projects.len()
        );
        self.cache
            .write()
            .await
            .insert(identity.clone(), model.clone());
        Ok(model)
    }
}

#[async_trait]
impl<L: ModelLoader> ModelFetchPort for CachingModelRepository<L> {
    async fn fetch(
        &self,
        identity: &ProjectIdentity,
        ctx: TransientInvocationContext,
        strategy: FetchStrategy,
    ) -> Result<BuildModel, FetchError> {
        debug!("Fetching model for {} ({})", identity, strategy);

        match strategy {
            FetchStrategy::Cached => self
                .cached(identity)
                .await
                .ok_or_else(|| FetchError::NotCached(identity.project_dir().to_path_buf())),
            FetchStrategy::CachedElseFetch => {
                if let Some(model) = self.cached(identity).await {
                    debug!("Cache hit for {}", identity);
                    return Ok(model);
                }
                self.load_and_cache(identity, ctx).await
            }
            FetchStrategy::ForceReload => {
                self.cache.write().await.remove(identity);
                self.load_and_cache(identity, ctx).await
            }
        }
    }
}
