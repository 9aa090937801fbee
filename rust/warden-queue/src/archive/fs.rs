//! The on-disk archive layout:
//!
//! ```text
//! <root>/queue/<queue>/<file>                                 waiting
//! <root>/suites/<suite>/pool/<component>/<poolified>/<file>   promoted
//! <root>/morgue/<queue>/<yyyy>/<mm>/<dd>/<file>               rejected
//! ```

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use super::{ArtifactArchive, poolify};
use crate::{ArchiveError, QueueEntry};

fn io_error(path: &Path, error: std::io::Error) -> ArchiveError {
    ArchiveError::Io(format!("{}: {error}", path.display()))
}

/// Reject anything that is not a single plain path component.
fn component(name: &str) -> Result<&str, ArchiveError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(ArchiveError::InvalidName(name.to_string())),
    }
}

/// An [`ArtifactArchive`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileSystemArchive {
    root_dir: PathBuf,
}

impl FileSystemArchive {
    /// An archive rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Where a queued file waits.
    pub fn queued_path(&self, queue: &str, filename: &str) -> Result<PathBuf, ArchiveError> {
        Ok(self
            .root_dir
            .join("queue")
            .join(component(queue)?)
            .join(component(filename)?))
    }

    /// Where a promoted file lands.
    pub fn pool_path(
        &self,
        suite: &str,
        component_name: &str,
        source: &str,
        filename: &str,
    ) -> Result<PathBuf, ArchiveError> {
        Ok(self
            .root_dir
            .join("suites")
            .join(component(suite)?)
            .join("pool")
            .join(component(component_name)?)
            .join(poolify(component(source)?))
            .join(component(filename)?))
    }

    fn morgue_dir(&self, queue: &str) -> Result<PathBuf, ArchiveError> {
        let today = Utc::now().date_naive();
        Ok(self
            .root_dir
            .join("morgue")
            .join(component(queue)?)
            .join(format!("{:04}", today.year()))
            .join(format!("{:02}", today.month()))
            .join(format!("{:02}", today.day())))
    }

    /// Move `from` to `to`, creating parent directories.
    ///
    /// If `from` is gone but `to` holds the file, an earlier attempt already
    /// moved it. If both exist with identical content, the earlier attempt
    /// copied but did not remove; finish it.
    async fn move_file(from: &Path, to: &Path) -> Result<(), ArchiveError> {
        let source_exists = tokio::fs::try_exists(from)
            .await
            .map_err(|e| io_error(from, e))?;
        let target_exists = tokio::fs::try_exists(to)
            .await
            .map_err(|e| io_error(to, e))?;

        match (source_exists, target_exists) {
            (false, true) => return Ok(()),
            (false, false) => {
                return Err(ArchiveError::MissingArtifact(from.display().to_string()));
            }
            (true, true) => {
                let queued = tokio::fs::read(from).await.map_err(|e| io_error(from, e))?;
                let existing = tokio::fs::read(to).await.map_err(|e| io_error(to, e))?;
                if blake3::hash(&queued) != blake3::hash(&existing) {
                    return Err(ArchiveError::Conflict(to.display().to_string()));
                }
            }
            (true, false) => {
                if let Some(parent) = to.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| io_error(parent, e))?;
                }
                tokio::fs::copy(from, to)
                    .await
                    .map_err(|e| io_error(to, e))?;
            }
        }

        tokio::fs::remove_file(from)
            .await
            .map_err(|e| io_error(from, e))
    }

    /// Where `from` goes in `dir`: the first of `name`, `name.1`, `name.2`,
    /// ... that is either free or already holds a copy of `from` left by an
    /// interrupted attempt.
    async fn morgue_slot(dir: &Path, name: &str, from: &Path) -> Result<PathBuf, ArchiveError> {
        let queued = blake3::hash(&tokio::fs::read(from).await.map_err(|e| io_error(from, e))?);

        let mut candidate = dir.join(name);
        let mut counter = 0;
        while tokio::fs::try_exists(&candidate)
            .await
            .map_err(|e| io_error(&candidate, e))?
        {
            let existing = tokio::fs::read(&candidate)
                .await
                .map_err(|e| io_error(&candidate, e))?;
            if blake3::hash(&existing) == queued {
                return Ok(candidate);
            }
            counter += 1;
            candidate = dir.join(format!("{name}.{counter}"));
        }
        Ok(candidate)
    }
}

#[async_trait]
impl ArtifactArchive for FileSystemArchive {
    async fn promote(&self, entry: &QueueEntry, suite: &str) -> Result<(), ArchiveError> {
        for artifact in &entry.artifacts {
            let from = self.queued_path(&entry.queue, &artifact.filename)?;
            let to = self.pool_path(suite, &artifact.component, &entry.source, &artifact.filename)?;
            Self::move_file(&from, &to).await?;
            tracing::debug!(from = %from.display(), to = %to.display(), "promoted artifact");
        }
        Ok(())
    }

    async fn discard(&self, entry: &QueueEntry) -> Result<(), ArchiveError> {
        let morgue = self.morgue_dir(&entry.queue)?;
        for artifact in &entry.artifacts {
            let from = self.queued_path(&entry.queue, &artifact.filename)?;
            if !tokio::fs::try_exists(&from)
                .await
                .map_err(|e| io_error(&from, e))?
            {
                // Already moved by an earlier attempt
                continue;
            }
            let to = Self::morgue_slot(&morgue, &artifact.filename, &from).await?;
            Self::move_file(&from, &to).await?;
            tracing::debug!(from = %from.display(), to = %to.display(), "moved to morgue");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Artifact;
    use pretty_assertions::assert_eq;

    fn entry() -> QueueEntry {
        QueueEntry::new("unchecked", "libfoo", "1.0", "unstable")
            .with_artifact(Artifact::new("source", "main", "libfoo_1.0.dsc"))
            .with_artifact(Artifact::new("amd64", "contrib", "libfoo1_1.0_amd64.deb"))
    }

    fn stage(archive: &FileSystemArchive, entry: &QueueEntry) -> anyhow::Result<()> {
        for artifact in &entry.artifacts {
            let path = archive.queued_path(&entry.queue, &artifact.filename)?;
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(&path, artifact.filename.as_bytes())?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn it_promotes_into_the_pool() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        let entry = entry();
        stage(&archive, &entry)?;

        archive.promote(&entry, "stable").await?;

        let dsc = tempdir
            .path()
            .join("suites/stable/pool/main/libf/libfoo/libfoo_1.0.dsc");
        let deb = tempdir
            .path()
            .join("suites/stable/pool/contrib/libf/libfoo/libfoo1_1.0_amd64.deb");
        assert_eq!(std::fs::read(dsc)?, b"libfoo_1.0.dsc");
        assert!(deb.exists());
        assert!(!archive.queued_path("unchecked", "libfoo_1.0.dsc")?.exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_resumes_a_partial_promotion() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        let entry = entry();
        stage(&archive, &entry)?;

        // First file already moved, second one copied but not removed
        let dsc_to = archive.pool_path("stable", "main", "libfoo", "libfoo_1.0.dsc")?;
        std::fs::create_dir_all(dsc_to.parent().unwrap())?;
        std::fs::rename(archive.queued_path("unchecked", "libfoo_1.0.dsc")?, &dsc_to)?;
        let deb_to = archive.pool_path("stable", "contrib", "libfoo", "libfoo1_1.0_amd64.deb")?;
        std::fs::create_dir_all(deb_to.parent().unwrap())?;
        std::fs::write(&deb_to, b"libfoo1_1.0_amd64.deb")?;

        archive.promote(&entry, "stable").await?;
        assert!(!archive.queued_path("unchecked", "libfoo1_1.0_amd64.deb")?.exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_refuses_to_overwrite_different_files() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        let entry = entry();
        stage(&archive, &entry)?;

        let dsc_to = archive.pool_path("stable", "main", "libfoo", "libfoo_1.0.dsc")?;
        std::fs::create_dir_all(dsc_to.parent().unwrap())?;
        std::fs::write(&dsc_to, b"something else")?;

        assert!(matches!(
            archive.promote(&entry, "stable").await,
            Err(ArchiveError::Conflict(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_missing_artifacts() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        assert!(matches!(
            archive.promote(&entry(), "stable").await,
            Err(ArchiveError::MissingArtifact(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn it_moves_rejected_files_to_the_morgue() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        let entry = entry();
        stage(&archive, &entry)?;
        archive.discard(&entry).await?;

        // A later upload under the same file name does not clobber the first
        stage(&archive, &entry)?;
        std::fs::write(
            archive.queued_path("unchecked", "libfoo_1.0.dsc")?,
            b"rebuilt libfoo_1.0.dsc",
        )?;
        archive.discard(&entry).await?;

        let morgue = archive.morgue_dir("unchecked")?;
        assert_eq!(std::fs::read(morgue.join("libfoo_1.0.dsc"))?, b"libfoo_1.0.dsc");
        assert_eq!(
            std::fs::read(morgue.join("libfoo_1.0.dsc.1"))?,
            b"rebuilt libfoo_1.0.dsc"
        );
        assert!(!tempdir.path().join("suites").exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_resumes_a_partial_discard_without_duplicates() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let archive = FileSystemArchive::new(tempdir.path());
        let entry = entry();
        stage(&archive, &entry)?;

        // An earlier attempt copied the source into the morgue but did not
        // remove it from the queue
        let morgue = archive.morgue_dir("unchecked")?;
        std::fs::create_dir_all(&morgue)?;
        std::fs::write(morgue.join("libfoo_1.0.dsc"), b"libfoo_1.0.dsc")?;

        archive.discard(&entry).await?;

        assert!(!archive.queued_path("unchecked", "libfoo_1.0.dsc")?.exists());
        assert!(!morgue.join("libfoo_1.0.dsc.1").exists());
        assert!(morgue.join("libfoo1_1.0_amd64.deb").exists());
        Ok(())
    }

    #[test]
    fn it_rejects_path_traversal() {
        let archive = FileSystemArchive::new("/srv/archive");
        assert_eq!(
            archive.queued_path("unchecked", "../../etc/passwd"),
            Err(ArchiveError::InvalidName("../../etc/passwd".into()))
        );
        assert!(archive.pool_path("stable", "main", "foo/bar", "x").is_err());
    }
}
