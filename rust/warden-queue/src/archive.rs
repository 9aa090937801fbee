use async_trait::async_trait;

use crate::{ArchiveError, QueueEntry};

mod fs;
pub use fs::*;

mod memory;
pub use memory::*;

/// Moves the files of a decided entry out of its policy queue.
#[async_trait]
pub trait ArtifactArchive: Send + Sync {
    /// Publish every artifact of `entry` into `suite`.
    ///
    /// Must be safe to call again after a partial failure.
    async fn promote(&self, entry: &QueueEntry, suite: &str) -> Result<(), ArchiveError>;

    /// Move every artifact of `entry` to the morgue.
    async fn discard(&self, entry: &QueueEntry) -> Result<(), ArchiveError>;
}

/// The pool directory of a source package: its first letter, or the first
/// four letters for `lib*` packages, followed by the package name.
///
/// ```
/// assert_eq!(warden_queue::poolify("bash"), "b/bash");
/// assert_eq!(warden_queue::poolify("libfoo"), "libf/libfoo");
/// ```
pub fn poolify(source: &str) -> String {
    let prefix: String = if source.starts_with("lib") {
        source.chars().take(4).collect()
    } else {
        source.chars().take(1).collect()
    };
    format!("{prefix}/{source}")
}
