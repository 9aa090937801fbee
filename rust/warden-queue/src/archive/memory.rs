use std::{collections::BTreeSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ArtifactArchive;
use crate::{ArchiveError, EntryKey, QueueEntry};

#[derive(Debug, Default)]
struct MemoryArchiveState {
    promoted: Vec<(EntryKey, String)>,
    discarded: Vec<EntryKey>,
    failing: BTreeSet<String>,
    delay: Option<Duration>,
}

/// An [`ArtifactArchive`] that records what it was asked to do.
///
/// Sources can be marked as failing to exercise retry paths, and a delay
/// can be set to exercise timeouts.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    state: Arc<RwLock<MemoryArchiveState>>,
}

impl MemoryArchive {
    /// An archive that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every move of this source fail until [`MemoryArchive::heal`].
    pub async fn fail_source(&self, source: &str) {
        self.state.write().await.failing.insert(source.to_string());
    }

    /// Stop failing moves of this source.
    pub async fn heal(&self, source: &str) {
        self.state.write().await.failing.remove(source);
    }

    /// Wait this long before every move.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Every successful promotion, as (entry, suite), in order.
    pub async fn promoted(&self) -> Vec<(EntryKey, String)> {
        self.state.read().await.promoted.clone()
    }

    /// Every successful discard, in order.
    pub async fn discarded(&self) -> Vec<EntryKey> {
        self.state.read().await.discarded.clone()
    }

    async fn before_move(&self, entry: &QueueEntry) -> Result<(), ArchiveError> {
        let (delay, failing) = {
            let state = self.state.read().await;
            (state.delay, state.failing.contains(&entry.source))
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(ArchiveError::Io(format!(
                "simulated failure moving {}",
                entry.key()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactArchive for MemoryArchive {
    async fn promote(&self, entry: &QueueEntry, suite: &str) -> Result<(), ArchiveError> {
        self.before_move(entry).await?;
        self.state
            .write()
            .await
            .promoted
            .push((entry.key(), suite.to_string()));
        Ok(())
    }

    async fn discard(&self, entry: &QueueEntry) -> Result<(), ArchiveError> {
        self.before_move(entry).await?;
        self.state.write().await.discarded.push(entry.key());
        Ok(())
    }
}
