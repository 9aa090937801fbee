//! A [`PolicyQueueStore`] on the local filesystem.
//!
//! Each entry is one JSON document at `<root>/<queue>/<name>.json`, where
//! `<name>` is the base58 encoding of `source` and `version`. Mutations take
//! a PID lock next to the document, re-read it, check it and write the new
//! version through a temporary file and an atomic rename, so concurrent
//! processes never both attach a decision to the same entry. Within one
//! process, mutations are additionally serialized by an async mutex shared
//! by all clones of the store.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use base58::ToBase58;
use pidlock::Pidlock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{PolicyQueueStore, check_attachable};
use crate::{Decision, EntryKey, QueueEntry, QueueError};

const ENTRY_EXTENSION: &str = "json";
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);
const LOCK_ATTEMPTS: usize = 500;

/// RAII guard over a PID lock file.
struct PidlockGuard(Pidlock);

impl PidlockGuard {
    /// Acquire the lock at `path`, waiting while another holder is alive.
    ///
    /// Locks left behind by dead processes are cleared and taken over.
    async fn acquire(path: &Path) -> Result<Self, QueueError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| QueueError::Storage("Lock path is not valid UTF-8".to_string()))?;

        let mut lock = Pidlock::new(path_str);

        for _ in 0..LOCK_ATTEMPTS {
            match lock.acquire() {
                Ok(()) => return Ok(Self(lock)),
                Err(pidlock::PidlockError::LockExists) => {
                    // get_owner() clears the lock when its owner is gone
                    if lock.get_owner().is_some() {
                        tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                    }
                }
                Err(e) => {
                    return Err(QueueError::Storage(format!(
                        "Failed to acquire lock: {e:?}"
                    )));
                }
            }
        }

        Err(QueueError::Storage(format!(
            "Timed out waiting for lock {}",
            path.display()
        )))
    }
}

impl Drop for PidlockGuard {
    fn drop(&mut self) {
        let _ = self.0.release();
    }
}

/// A filesystem-backed [`PolicyQueueStore`].
#[derive(Debug, Clone)]
pub struct FileSystemPolicyQueue {
    root_dir: PathBuf,
    writer: Arc<Mutex<()>>,
}

/// Held for the duration of one mutation.
struct EntryLock {
    _pidlock: PidlockGuard,
    _writer: OwnedMutexGuard<()>,
}

impl FileSystemPolicyQueue {
    /// Open (creating if needed) a store rooted at `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, QueueError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| QueueError::Storage(format!("{error}")))?;
        Ok(Self {
            root_dir,
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn queue_dir(&self, queue: &str) -> Result<PathBuf, QueueError> {
        if queue.is_empty() || queue == "." || queue == ".." || queue.contains(['/', '\\']) {
            return Err(QueueError::Storage(format!("invalid queue name '{queue}'")));
        }
        Ok(self.root_dir.join(queue))
    }

    fn entry_name(key: &EntryKey) -> String {
        format!("{}\0{}", key.source, key.version)
            .as_bytes()
            .to_base58()
    }

    fn entry_path(&self, key: &EntryKey) -> Result<PathBuf, QueueError> {
        Ok(self
            .queue_dir(&key.queue)?
            .join(format!("{}.{ENTRY_EXTENSION}", Self::entry_name(key))))
    }

    fn lock_path(&self, key: &EntryKey) -> Result<PathBuf, QueueError> {
        Ok(self
            .queue_dir(&key.queue)?
            .join(format!("{}.lock", Self::entry_name(key))))
    }

    async fn read_entry(path: &Path) -> Result<Option<QueueEntry>, QueueError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| QueueError::Storage(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(QueueError::Storage(e.to_string())),
        }
    }

    async fn write_entry(path: &Path, entry: &QueueEntry) -> Result<(), QueueError> {
        let content =
            serde_json::to_vec_pretty(entry).map_err(|e| QueueError::Storage(e.to_string()))?;

        // Hash in the name keeps concurrent writers of different content apart
        let hash: [u8; 32] = blake3::hash(&content).into();
        let tmp_path = path.with_extension(format!("{}.tmp", hash.to_base58()));

        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))
    }

    async fn locked(&self, key: &EntryKey) -> Result<(PathBuf, EntryLock), QueueError> {
        let dir = self.queue_dir(&key.queue)?;
        let writer = self.writer.clone().lock_owned().await;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        let pidlock = PidlockGuard::acquire(&self.lock_path(key)?).await?;
        Ok((
            self.entry_path(key)?,
            EntryLock {
                _pidlock: pidlock,
                _writer: writer,
            },
        ))
    }
}

#[async_trait]
impl PolicyQueueStore for FileSystemPolicyQueue {
    async fn insert(&self, entry: QueueEntry) -> Result<(), QueueError> {
        let key = entry.key();
        let (path, _guard) = self.locked(&key).await?;

        if Self::read_entry(&path).await?.is_some() {
            return Err(QueueError::DuplicateEntry(key));
        }
        Self::write_entry(&path, &entry).await?;

        tracing::debug!(entry = %key, "queued");
        Ok(())
    }

    async fn find(
        &self,
        queue: &str,
        source: &str,
        version: &str,
    ) -> Result<QueueEntry, QueueError> {
        let key = EntryKey::new(queue, source, version);
        Self::read_entry(&self.entry_path(&key)?)
            .await?
            .ok_or(QueueError::NotFound(key))
    }

    async fn attach_decision(
        &self,
        key: &EntryKey,
        decision: Decision,
    ) -> Result<QueueEntry, QueueError> {
        let (path, _guard) = self.locked(key).await?;

        let mut entry = Self::read_entry(&path)
            .await?
            .ok_or_else(|| QueueError::NotFound(key.clone()))?;
        check_attachable(&entry, &decision)?;
        entry.decision = decision;
        Self::write_entry(&path, &entry).await?;

        tracing::debug!(entry = %key, decision = entry.decision.label(), "decision attached");
        Ok(entry)
    }

    async fn remove(&self, key: &EntryKey) -> Result<QueueEntry, QueueError> {
        let (path, _guard) = self.locked(key).await?;

        let entry = Self::read_entry(&path)
            .await?
            .ok_or_else(|| QueueError::NotFound(key.clone()))?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(QueueError::Storage(e.to_string())),
        }

        tracing::debug!(entry = %key, "removed");
        Ok(entry)
    }

    async fn list(&self, queue: &str) -> Result<Vec<QueueEntry>, QueueError> {
        let dir = self.queue_dir(queue)?;
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(QueueError::Storage(e.to_string())),
        };

        let mut entries = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| QueueError::Storage(e.to_string()))?
        {
            let path = item.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            // Removed between listing and reading
            if let Some(entry) = Self::read_entry(&path).await? {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(entries)
    }
}
