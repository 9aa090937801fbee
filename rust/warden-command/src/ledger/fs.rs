//! A [`Ledger`] on the local filesystem: one small JSON file per consumed
//! document, named after the base58 digest.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use warden_credentials::DocumentDigest;

use super::{Ledger, LedgerRecord};
use crate::LedgerError;

/// A filesystem-backed [`Ledger`].
#[derive(Debug, Clone)]
pub struct FileSystemLedger {
    root_dir: PathBuf,
}

impl FileSystemLedger {
    /// Open (creating if needed) a ledger rooted at `root_dir`.
    pub async fn new<Pathlike>(root_dir: Pathlike) -> Result<Self, LedgerError>
    where
        Pathlike: AsRef<Path>,
    {
        let root_dir = root_dir.as_ref().to_owned();
        tokio::fs::create_dir_all(&root_dir)
            .await
            .map_err(|error| LedgerError::Storage(format!("{error}")))?;
        Ok(Self { root_dir })
    }

    fn record_path(&self, digest: &DocumentDigest) -> PathBuf {
        self.root_dir.join(format!("{digest}.json"))
    }
}

#[async_trait]
impl Ledger for FileSystemLedger {
    async fn contains(&self, digest: &DocumentDigest) -> Result<bool, LedgerError> {
        tokio::fs::try_exists(self.record_path(digest))
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))
    }

    async fn record(
        &self,
        digest: &DocumentDigest,
        record: LedgerRecord,
    ) -> Result<bool, LedgerError> {
        let content =
            serde_json::to_vec_pretty(&record).map_err(|e| LedgerError::Storage(e.to_string()))?;

        // create_new makes the existence check and the write one step
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.record_path(digest))
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(LedgerError::Storage(e.to_string())),
        };

        file.write_all(&content)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(true)
    }

    async fn get(&self, digest: &DocumentDigest) -> Result<Option<LedgerRecord>, LedgerError> {
        match tokio::fs::read(self.record_path(digest)).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Storage(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::Storage(e.to_string())),
        }
    }
}
