use std::time::Duration;

use tracing::Instrument;

use crate::{
    ApplyError, ArtifactArchive, Decision, EntryKey, PolicyQueueStore, QueueEntry, QueueError,
};

/// Default bound on moving the artifacts of one entry.
pub const DEFAULT_ARTIFACT_TIMEOUT: Duration = Duration::from_secs(60);

/// What happened to a decided entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Artifacts were published into `suite` and the entry removed.
    Promoted {
        /// Where the artifacts went.
        suite: String,
    },
    /// Artifacts were moved to the morgue and the entry removed.
    Rejected,
}

/// The result of one scan of a policy queue.
#[derive(Debug, Default)]
pub struct PolicyRunReport {
    /// Decided entries and what became of them, in key order.
    pub applied: Vec<(EntryKey, Result<Applied, ApplyError>)>,
    /// Entries still waiting for a decision.
    pub unresolved: Vec<EntryKey>,
}

impl PolicyRunReport {
    /// Whether any decided entry could not be applied.
    pub fn has_failures(&self) -> bool {
        self.applied.iter().any(|(_, result)| result.is_err())
    }
}

/// Applies attached decisions: promotes accepted entries into their
/// effective suite and moves rejected ones to the morgue.
///
/// An entry is only removed from the queue once its artifacts are moved;
/// any failure before that leaves it queued, still carrying its decision,
/// for the next scan to retry.
#[derive(Debug, Clone)]
pub struct PolicyQueueProcessor<Store, Archive>
where
    Store: PolicyQueueStore,
    Archive: ArtifactArchive,
{
    store: Store,
    archive: Archive,
    artifact_timeout: Duration,
}

impl<Store, Archive> PolicyQueueProcessor<Store, Archive>
where
    Store: PolicyQueueStore,
    Archive: ArtifactArchive,
{
    /// A processor over the given store and archive.
    pub fn new(store: Store, archive: Archive) -> Self {
        Self {
            store,
            archive,
            artifact_timeout: DEFAULT_ARTIFACT_TIMEOUT,
        }
    }

    /// Bound how long moving the artifacts of one entry may take.
    pub fn with_artifact_timeout(mut self, timeout: Duration) -> Self {
        self.artifact_timeout = timeout;
        self
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Scan `queue` once. Only a failure to list the queue aborts the scan;
    /// per-entry failures are collected in the report.
    pub async fn process(&self, queue: &str) -> Result<PolicyRunReport, QueueError> {
        let mut report = PolicyRunReport::default();

        for entry in self.store.list(queue).await? {
            let key = entry.key();
            if !entry.decision.is_resolved() {
                tracing::trace!(entry = %key, "no decision yet");
                report.unresolved.push(key);
                continue;
            }

            let span = tracing::info_span!("apply", entry = %key);
            let result = self.apply(entry).instrument(span).await;
            match &result {
                Ok(applied) => tracing::info!(entry = %key, ?applied, "applied decision"),
                Err(error) => {
                    tracing::warn!(entry = %key, %error, "decision not applied, will retry")
                }
            }
            report.applied.push((key, result));
        }

        Ok(report)
    }

    /// Apply the decision of one entry.
    pub async fn apply(&self, entry: QueueEntry) -> Result<Applied, ApplyError> {
        let key = entry.key();
        let (moved, applied) = match &entry.decision {
            Decision::Accepted { .. } => {
                let suite = entry.effective_suite().to_string();
                let moved = tokio::time::timeout(
                    self.artifact_timeout,
                    self.archive.promote(&entry, &suite),
                )
                .await;
                (moved, Applied::Promoted { suite })
            }
            Decision::Rejected { .. } => {
                let moved =
                    tokio::time::timeout(self.artifact_timeout, self.archive.discard(&entry)).await;
                (moved, Applied::Rejected)
            }
            Decision::Unresolved => return Err(QueueError::Unresolved(key).into()),
        };

        match moved {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(ApplyError::ArtifactMoveFailed { key, reason }),
            Err(_) => {
                return Err(ApplyError::Timeout {
                    key,
                    after: self.artifact_timeout,
                });
            }
        }

        self.store.remove(&key).await?;
        Ok(applied)
    }
}
