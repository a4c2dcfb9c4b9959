//! Review store trait definition.

use crate::core::error::{ReviewError, ReviewResult};
use crate::review::record::ReviewEntry;

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Persistence for the review collection.
///
/// Stores read and write the whole collection at once. They do no locking
/// of their own; [`ReviewQueue`](crate::review::ReviewQueue) serializes
/// every load-mutate-save cycle. A store that returns a [`lock_key`]
/// shares that serialization with every other queue over the same key.
///
/// [`lock_key`]: ReviewStore::lock_key
///
/// # Example Implementation
///
/// ```rust,ignore
/// use scanwarden::review::{ReviewEntry, ReviewStore};
/// use scanwarden::core::ReviewResult;
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct RedisStore { /* ... */ }
///
/// #[async_trait]
/// impl ReviewStore for RedisStore {
///     async fn load(&self) -> ReviewResult<Vec<ReviewEntry>> {
///         todo!()
///     }
///
///     async fn save(&self, entries: &[ReviewEntry]) -> ReviewResult<()> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait ReviewStore: Send + Sync + Debug {
    /// Reads the full collection. A store that has never been written is empty.
    async fn load(&self) -> ReviewResult<Vec<ReviewEntry>>;

    /// Replaces the full collection.
    async fn save(&self, entries: &[ReviewEntry]) -> ReviewResult<()>;

    /// Names the backing resource for process-wide locking.
    fn lock_key(&self) -> Option<PathBuf> {
        None
    }
}

/// An in-memory review store.
///
/// Useful for tests and for deployments that do not need persistence.
/// Writes can be made to fail to exercise fault handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<ReviewEntry>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with existing entries.
    pub fn with_entries(entries: Vec<ReviewEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes subsequent saves fail with `StoreFault`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn load(&self) -> ReviewResult<Vec<ReviewEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    async fn save(&self, entries: &[ReviewEntry]) -> ReviewResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ReviewError::store_fault("simulated write failure"));
        }
        *self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = entries.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_empty());

        store.save(&[ReviewEntry::new("ClamAV", "a")]).await.unwrap();
        assert_eq!(store.load().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_fault_injection() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.save(&[]).await.unwrap_err();
        assert!(matches!(err, ReviewError::StoreFault { .. }));
    }
}
