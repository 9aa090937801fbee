use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PolicyQueueStore, check_attachable};
use crate::{Decision, EntryKey, QueueEntry, QueueError};

/// A [`PolicyQueueStore`] that keeps entries in memory. Clones share the
/// same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyQueue {
    entries: Arc<RwLock<BTreeMap<EntryKey, QueueEntry>>>,
}

impl MemoryPolicyQueue {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyQueueStore for MemoryPolicyQueue {
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let mut entries = self.entries.write().await;
        let key = entry.key();
        if entries.contains_key(&key) {
            return Err(QueueError::DuplicateEntry(key));
        }
        entries.insert(key, entry);
        Ok(())
    }

    async fn find(
        &self,
        queue: &str,
        source: &str,
        version: &str,
    ) -> Result<QueueEntry, QueueError> {
        let key = EntryKey::new(queue, source, version);
        self.entries
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or(QueueError::NotFound(key))
    }

    async fn attach_decision(
        &self,
        key: &EntryKey,
        decision: Decision,
    ) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| QueueError::NotFound(key.clone()))?;
        check_attachable(entry, &decision)?;
        entry.decision = decision;
        Ok(entry.clone())
    }

    async fn remove(&self, key: &EntryKey) -> Result<QueueEntry, QueueError> {
        self.entries
            .write()
            .await
            .remove(key)
            .ok_or_else(|| QueueError::NotFound(key.clone()))
    }

    async fn list(&self, queue: &str) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.queue == queue)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use warden_credentials::Fingerprint;

    fn accepted() -> Decision {
        Decision::Accepted {
            by: Fingerprint::from([0xaa; 20]),
            at: Utc::now(),
            reason: None,
        }
    }

    #[tokio::test]
    async fn it_rejects_duplicate_entries() -> anyhow::Result<()> {
        let store = MemoryPolicyQueue::new();
        store
            .insert(QueueEntry::new("unchecked", "foo", "1.0", "unstable"))
            .await?;
        let result = store
            .insert(QueueEntry::new("unchecked", "foo", "1.0", "unstable"))
            .await;
        assert_eq!(
            result,
            Err(QueueError::DuplicateEntry(EntryKey::new(
                "unchecked",
                "foo",
                "1.0"
            )))
        );

        // Same package in another queue is a different entry.
        store
            .insert(QueueEntry::new("new", "foo", "1.0", "unstable"))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn it_attaches_exactly_one_decision() -> anyhow::Result<()> {
        let store = MemoryPolicyQueue::new();
        let entry = QueueEntry::new("unchecked", "foo", "1.0", "unstable");
        let key = entry.key();
        store.insert(entry).await?;

        let updated = store.attach_decision(&key, accepted()).await?;
        assert!(updated.decision.is_resolved());
        assert_eq!(
            store.attach_decision(&key, accepted()).await,
            Err(QueueError::AlreadyResolved(key.clone()))
        );
        assert_eq!(
            store.attach_decision(&key, Decision::Unresolved).await,
            Err(QueueError::Unresolved(key))
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_removed_entries_as_not_found() -> anyhow::Result<()> {
        let store = MemoryPolicyQueue::new();
        let entry = QueueEntry::new("unchecked", "foo", "1.0", "unstable");
        let key = entry.key();
        store.insert(entry).await?;
        store.remove(&key).await?;

        assert_eq!(
            store.find("unchecked", "foo", "1.0").await,
            Err(QueueError::NotFound(key.clone()))
        );
        assert_eq!(
            store.attach_decision(&key, accepted()).await,
            Err(QueueError::NotFound(key))
        );
        Ok(())
    }

    #[tokio::test]
    async fn it_lists_one_queue_in_key_order() -> anyhow::Result<()> {
        let store = MemoryPolicyQueue::new();
        for (queue, source) in [("new", "zsh"), ("new", "bash"), ("unchecked", "dash")] {
            store
                .insert(QueueEntry::new(queue, source, "1.0", "unstable"))
                .await?;
        }
        let sources: Vec<_> = store
            .list("new")
            .await?
            .into_iter()
            .map(|entry| entry.source)
            .collect();
        assert_eq!(sources, vec!["bash".to_string(), "zsh".to_string()]);
        Ok(())
    }
}
