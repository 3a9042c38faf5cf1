//! Exclusive regions over shared resources.
//!
//! A region serializes every job that mutates the same resource. Waiters
//! queue in FIFO order, so no job starves, and the holder keeps the region
//! across as many sub-operations as it needs.

use buildsync_progress::ProgressScope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Name of a shared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Create a key.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The key shared by everything that mutates the workspace.
    pub fn workspace_root() -> Self {
        Self("workspace-root".to_string())
    }

    /// Key name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self::workspace_root()
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an acquisition did not happen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    /// The token was cancelled before the region became free
    #[error("cancelled while waiting for {0}")]
    Cancelled(ResourceKey),
}

#[derive(Debug, Default)]
struct RegionStats {
    acquisitions: AtomicU64,
    releases: AtomicU64,
}

/// Keyed mutual exclusion for long-held critical sections.
#[derive(Debug, Default)]
pub struct ExclusiveRegion {
    locks: Mutex<HashMap<ResourceKey, Arc<tokio::sync::Mutex<()>>>>,
    stats: Arc<RegionStats>,
}

impl ExclusiveRegion {
    /// Create a region with no keys held.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &ResourceKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Wait until no one else holds `key`, then hold it.
    ///
    /// `scope` is the progress slice set aside for the wait. While blocked it
    /// runs as an indeterminate span naming the key, and it is completed once
    /// the region is held or the wait is abandoned. Returns
    /// [`RegionError::Cancelled`] without acquiring if `token` is cancelled
    /// first.
    pub async fn acquire(
        &self,
        key: &ResourceKey,
        scope: &ProgressScope,
        token: &CancellationToken,
    ) -> Result<RegionGuard, RegionError> {
        if token.is_cancelled() {
            scope.done();
            return Err(RegionError::Cancelled(key.clone()));
        }

        let lock = self.lock_for(key);
        let guard = match Arc::clone(&lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Region {} is held, waiting", key);
                scope.report_indeterminate(format!("Waiting for {} to be released", key));
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Cancelled while waiting for region {}", key);
                        scope.done();
                        return Err(RegionError::Cancelled(key.clone()));
                    }
                    guard = lock.lock_owned() => guard,
                }
            }
        };

        scope.done();
        self.stats.acquisitions.fetch_add(1, Ordering::SeqCst);
        debug!("Acquired region {}", key);

        Ok(RegionGuard {
            key: key.clone(),
            guard: Some(guard),
            stats: Arc::clone(&self.stats),
        })
    }

    /// Whether someone currently holds `key`.
    pub fn is_held(&self, key: &ResourceKey) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.get(key).is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Total successful acquisitions.
    pub fn acquisitions(&self) -> u64 {
        self.stats.acquisitions.load(Ordering::SeqCst)
    }

    /// Total releases.
    pub fn releases(&self) -> u64 {
        self.stats.releases.load(Ordering::SeqCst)
    }
}

/// Holds a region until released or dropped.
#[derive(Debug)]
pub struct RegionGuard {
    key: ResourceKey,
    guard: Option<OwnedMutexGuard<()>>,
    stats: Arc<RegionStats>,
}

impl RegionGuard {
    /// Release the region. Later calls do nothing.
    pub fn release(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard);
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
            debug!("Released region {}", self.key);
        }
    }

    /// Key this guard holds.
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Whether the region is still held by this guard.
    pub fn is_held(&self) -> bool {
        self.guard.is_some()
    }
}

impl Drop for RegionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_release_counts() {
        let region = ExclusiveRegion::new();
        let key = ResourceKey::workspace_root();
        let scope = ProgressScope::detached();
        let token = CancellationToken::new();

        let mut guard = region.acquire(&key, &scope, &token).await.unwrap();
        assert!(region.is_held(&key));
        assert!(guard.is_held());

        guard.release();
        guard.release();
        drop(guard);

        assert!(!region.is_held(&key));
        assert_eq!(region.acquisitions(), 1);
        assert_eq!(region.releases(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let region = ExclusiveRegion::new();
        let scope = ProgressScope::detached();
        let token = CancellationToken::new();

        let _a = region.acquire(&ResourceKey::new("a"), &scope, &token).await.unwrap();
        let b = tokio::time::timeout(
            Duration::from_millis(200),
            region.acquire(&ResourceKey::new("b"), &scope, &token),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_gets_region_after_release() {
        let region = Arc::new(ExclusiveRegion::new());
        let key = ResourceKey::workspace_root();
        let scope = ProgressScope::detached();
        let token = CancellationToken::new();

        let first = region.acquire(&key, &scope, &token).await.unwrap();

        let waiter = {
            let region = Arc::clone(&region);
            let key = key.clone();
            tokio::spawn(async move {
                let scope = ProgressScope::detached();
                let token = CancellationToken::new();
                region.acquire(&key, &scope, &token).await.map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap().unwrap();
        assert_eq!(region.acquisitions(), 2);
        assert_eq!(region.releases(), 2);
    }

    #[tokio::test]
    async fn test_wait_consumes_reserved_slice() {
        let region = Arc::new(ExclusiveRegion::new());
        let key = ResourceKey::workspace_root();
        let token = CancellationToken::new();
        let first = region
            .acquire(&key, &ProgressScope::detached(), &token)
            .await
            .unwrap();

        let root = Arc::new(ProgressScope::detached());
        root.begin("job", 10);
        let waiter = {
            let region = Arc::clone(&region);
            let root = Arc::clone(&root);
            let key = key.clone();
            tokio::spawn(async move {
                let scope = root.child(4).unwrap();
                let guard = region.acquire(&key, &scope, &CancellationToken::new()).await;
                guard.map(|g| g.key().clone())
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(root.completed(), 0.0);
        assert_eq!(root.allocated(), 4);

        drop(first);
        let held = waiter.await.unwrap().unwrap();
        assert_eq!(held, key);
        assert!((root.completed() - 4.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_uncontended_acquire_completes_slice() {
        let region = ExclusiveRegion::new();
        let root = ProgressScope::detached();
        root.begin("job", 10);
        let scope = root.child(3).unwrap();

        let guard = region
            .acquire(&ResourceKey::new("a"), &scope, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(guard.key().as_str(), "a");
        assert!(scope.is_done());
        assert!((root.completed() - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting() {
        let region = Arc::new(ExclusiveRegion::new());
        let key = ResourceKey::workspace_root();
        let scope = ProgressScope::detached();
        let holder_token = CancellationToken::new();
        let _held = region.acquire(&key, &scope, &holder_token).await.unwrap();

        let token = CancellationToken::new();
        let waiter = {
            let region = Arc::clone(&region);
            let key = key.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let scope = ProgressScope::detached();
                region.acquire(&key, &scope, &token).await.map(|_| ())
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err, RegionError::Cancelled(key));
        assert_eq!(region.acquisitions(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_never_acquires() {
        let region = ExclusiveRegion::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = region
            .acquire(&ResourceKey::workspace_root(), &ProgressScope::detached(), &token)
            .await;
        assert!(result.is_err());
        assert_eq!(region.acquisitions(), 0);
    }
}
