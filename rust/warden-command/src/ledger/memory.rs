use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_credentials::DocumentDigest;

use super::{Ledger, LedgerRecord};
use crate::LedgerError;

/// A [`Ledger`] that forgets everything when dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Arc<RwLock<HashMap<DocumentDigest, LedgerRecord>>>,
}

impl MemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn contains(&self, digest: &DocumentDigest) -> Result<bool, LedgerError> {
        Ok(self.records.read().await.contains_key(digest))
    }

    async fn record(
        &self,
        digest: &DocumentDigest,
        record: LedgerRecord,
    ) -> Result<bool, LedgerError> {
        let mut records = self.records.write().await;
        if records.contains_key(digest) {
            return Ok(false);
        }
        records.insert(*digest, record);
        Ok(true)
    }

    async fn get(&self, digest: &DocumentDigest) -> Result<Option<LedgerRecord>, LedgerError> {
        Ok(self.records.read().await.get(digest).cloned())
    }
}
