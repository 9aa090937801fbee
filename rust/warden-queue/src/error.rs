use std::time::Duration;

use thiserror::Error;

use crate::EntryKey;

/// Errors from a [`crate::PolicyQueueStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// No entry with this key is queued.
    #[error("{0} not found in policy queue")]
    NotFound(EntryKey),

    /// An entry with this key is already queued.
    #[error("{0} is already queued")]
    DuplicateEntry(EntryKey),

    /// The entry already carries a decision.
    #[error("{0} already has a decision")]
    AlreadyResolved(EntryKey),

    /// Only accept or reject decisions can be attached.
    #[error("cannot attach an unresolved decision to {0}")]
    Unresolved(EntryKey),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors from an [`crate::ArtifactArchive`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// A queued file is missing.
    #[error("missing artifact {0}")]
    MissingArtifact(String),

    /// A different file already occupies the destination.
    #[error("destination {0} already exists with different content")]
    Conflict(String),

    /// A name cannot be used as a path component.
    #[error("invalid path component '{0}'")]
    InvalidName(String),

    /// The filesystem failed.
    #[error("I/O error: {0}")]
    Io(String),
}

/// Why a decided entry could not be applied. The entry stays queued with its
/// decision, so every variant is retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    /// Moving the artifacts failed.
    #[error("moving artifacts of {key} failed: {reason}")]
    ArtifactMoveFailed {
        /// The entry.
        key: EntryKey,
        /// What went wrong.
        reason: ArchiveError,
    },

    /// Moving the artifacts did not finish in time.
    #[error("moving artifacts of {key} timed out after {after:?}")]
    Timeout {
        /// The entry.
        key: EntryKey,
        /// The configured bound.
        after: Duration,
    },

    /// The queue store failed while removing the entry.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
