use async_trait::async_trait;

use crate::{Decision, EntryKey, QueueEntry, QueueError};

mod fs;
pub use fs::*;

mod memory;
pub use memory::*;

/// Durable storage for policy queue entries.
///
/// Every operation is atomic with respect to a single entry: two concurrent
/// [`PolicyQueueStore::attach_decision`] calls on the same entry never both
/// succeed.
#[async_trait]
pub trait PolicyQueueStore: Send + Sync {
    /// Queue a new entry. Fails with [`QueueError::DuplicateEntry`] if an
    /// entry with the same key exists.
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError>;

    /// Look an entry up.
    async fn find(&self, queue: &str, source: &str, version: &str)
    -> Result<QueueEntry, QueueError>;

    /// Attach an accept or reject decision to an undecided entry and return
    /// the updated entry. Fails with [`QueueError::AlreadyResolved`] if a
    /// decision is already attached.
    async fn attach_decision(
        &self,
        key: &EntryKey,
        decision: Decision,
    ) -> Result<QueueEntry, QueueError>;

    /// Remove an entry whose decision has been applied, returning it.
    async fn remove(&self, key: &EntryKey) -> Result<QueueEntry, QueueError>;

    /// Every entry of a queue, ordered by source then version.
    async fn list(&self, queue: &str) -> Result<Vec<QueueEntry>, QueueError>;
}

/// Shared check used by every backend before a decision is stored.
pub(crate) fn check_attachable(
    entry: &QueueEntry,
    decision: &Decision,
) -> Result<(), QueueError> {
    if !decision.is_resolved() {
        return Err(QueueError::Unresolved(entry.key()));
    }
    if entry.decision.is_resolved() {
        return Err(QueueError::AlreadyResolved(entry.key()));
    }
    Ok(())
}
