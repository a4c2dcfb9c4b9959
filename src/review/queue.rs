//! The review queue: serialized mutations over a [`ReviewStore`].

use crate::audit::events;
use crate::core::error::{ReviewError, ReviewResult};
use crate::review::record::{ReviewEntry, ReviewRef};
use crate::review::traits::ReviewStore;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, OnceLock, Weak};
use tokio::sync::Mutex;

/// Manual-review queue.
///
/// Every operation, reads included, holds one async mutex across the whole
/// load-mutate-save cycle, so two concurrent requests can never lose each
/// other's writes and a positional reference is resolved against the same
/// collection that gets saved.
///
/// The mutex is process-wide per [`ReviewStore::lock_key`]: queues opened
/// separately on the same review file share it. Stores without a key, such
/// as [`MemoryStore`](crate::review::MemoryStore), get one mutex per queue.
///
/// # Example
///
/// ```rust
/// use scanwarden::review::{MemoryStore, ReviewEntry, ReviewQueue, ReviewRef};
/// use std::sync::Arc;
///
/// # tokio_test_block(async {
/// let queue = ReviewQueue::new(Arc::new(MemoryStore::new()));
/// queue.append(ReviewEntry::new("ClamAV", "upload.zip")).await?;
/// queue.mark_reviewed(ReviewRef::Position(0)).await?;
/// assert_eq!(queue.pending_count().await?, 0);
/// # Ok::<(), scanwarden::core::ReviewError>(())
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct ReviewQueue {
    store: Arc<dyn ReviewStore>,
    lock: Arc<Mutex<()>>,
}

impl ReviewQueue {
    /// Creates a queue over the given store.
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        let lock = match store.lock_key() {
            Some(key) => shared_lock(key),
            None => Arc::new(Mutex::new(())),
        };
        Self { store, lock }
    }

    /// Appends an entry and returns it as stored.
    pub async fn append(&self, entry: ReviewEntry) -> ReviewResult<ReviewEntry> {
        let _guard = self.lock.lock().await;
        let mut entries = self.store.load().await?;
        entries.push(entry.clone());
        self.store.save(&entries).await?;

        events::emit_review_change("created", &entry);
        Ok(entry)
    }

    /// Returns all entries in insertion order.
    pub async fn list(&self) -> ReviewResult<Vec<ReviewEntry>> {
        let _guard = self.lock.lock().await;
        self.store.load().await
    }

    /// Returns one entry.
    pub async fn get(&self, reference: &ReviewRef) -> ReviewResult<ReviewEntry> {
        let _guard = self.lock.lock().await;
        let entries = self.store.load().await?;
        let index = resolve(&entries, reference)?;
        Ok(entries[index].clone())
    }

    /// Marks an entry reviewed. Marking an already reviewed entry is a no-op.
    pub async fn mark_reviewed(&self, reference: ReviewRef) -> ReviewResult<ReviewEntry> {
        let _guard = self.lock.lock().await;
        let mut entries = self.store.load().await?;
        let index = resolve(&entries, &reference)?;

        if entries[index].mark_reviewed() {
            self.store.save(&entries).await?;
            events::emit_review_change("reviewed", &entries[index]);
        } else {
            tracing::debug!(id = %entries[index].id, "Review entry already reviewed");
        }
        Ok(entries[index].clone())
    }

    /// Deletes an entry; later entries shift down one position.
    pub async fn delete(&self, reference: ReviewRef) -> ReviewResult<ReviewEntry> {
        let _guard = self.lock.lock().await;
        let mut entries = self.store.load().await?;
        let index = resolve(&entries, &reference)?;

        let removed = entries.remove(index);
        self.store.save(&entries).await?;

        events::emit_review_change("deleted", &removed);
        Ok(removed)
    }

    /// Returns the number of entries awaiting review.
    pub async fn pending_count(&self) -> ReviewResult<usize> {
        let _guard = self.lock.lock().await;
        let entries = self.store.load().await?;
        Ok(entries.iter().filter(|e| e.is_pending()).count())
    }
}

type LockRegistry = StdMutex<HashMap<PathBuf, Weak<Mutex<()>>>>;

fn shared_lock(key: PathBuf) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<LockRegistry> = OnceLock::new();

    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.retain(|_, lock| lock.strong_count() > 0);

    if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
        return lock;
    }
    let lock = Arc::new(Mutex::new(()));
    locks.insert(key, Arc::downgrade(&lock));
    lock
}

fn resolve(entries: &[ReviewEntry], reference: &ReviewRef) -> ReviewResult<usize> {
    match reference {
        ReviewRef::Position(index) if *index < entries.len() => Ok(*index),
        ReviewRef::Position(index) => Err(ReviewError::IndexOutOfRange {
            index: *index,
            len: entries.len(),
        }),
        ReviewRef::Id(id) => entries
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| ReviewError::NotFound { id: id.to_string() }),
    }
}
