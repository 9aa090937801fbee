use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_credentials::{DocumentDigest, Fingerprint};

use crate::LedgerError;

mod fs;
pub use fs::*;

mod memory;
pub use memory::*;

/// What the ledger remembers about a consumed command document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    /// File name the document was submitted under.
    pub file: String,
    /// The signer, when the signature could be verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// When the document was consumed.
    pub consumed: DateTime<Utc>,
}

/// The persistent set of consumed command documents, keyed by content
/// digest.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether a document with this digest was already consumed.
    async fn contains(&self, digest: &DocumentDigest) -> Result<bool, LedgerError>;

    /// Record a document as consumed. Returns `false`, leaving the existing
    /// record untouched, if it was already recorded.
    async fn record(
        &self,
        digest: &DocumentDigest,
        record: LedgerRecord,
    ) -> Result<bool, LedgerError>;

    /// The record of a consumed document.
    async fn get(&self, digest: &DocumentDigest) -> Result<Option<LedgerRecord>, LedgerError>;
}
