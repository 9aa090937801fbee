use std::fmt;

use base58::ToBase58;
use serde::{Deserialize, Serialize};

/// The size of a BLAKE3 digest in bytes.
pub const DOCUMENT_DIGEST_SIZE: usize = 32;

/// The content identity of a submitted document.
///
/// Replay protection is keyed on what was signed, not on what the file
/// happens to be called or how it was wrapped in transit. See
/// [`crate::ClearSigned::digest`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentDigest([u8; DOCUMENT_DIGEST_SIZE]);

impl DocumentDigest {
    /// Computes the BLAKE3 digest of the given bytes.
    pub fn hash(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// Computes the BLAKE3 digest of the concatenation of `parts`.
    pub fn hash_all<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// The raw digest bytes.
    pub fn bytes(&self) -> &[u8; DOCUMENT_DIGEST_SIZE] {
        &self.0
    }
}

impl From<[u8; DOCUMENT_DIGEST_SIZE]> for DocumentDigest {
    fn from(value: [u8; DOCUMENT_DIGEST_SIZE]) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base58())
    }
}

impl fmt::Debug for DocumentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentDigest({self})")
    }
}
