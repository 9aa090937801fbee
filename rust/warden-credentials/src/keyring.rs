use serde::{Deserialize, Serialize};

use crate::{Fingerprint, PublicKey};

fn active_by_default() -> bool {
    true
}

/// A named collection of public keys.
///
/// Keyrings are how trust is provisioned: a key is either in a keyring the
/// archive knows about, or its signatures are not accepted at all. An
/// inactive keyring is kept for the record but contributes no keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyring {
    /// Unique keyring name.
    pub name: String,
    /// Whether keys in this keyring are currently trusted.
    #[serde(default = "active_by_default")]
    pub active: bool,
    /// Member keys.
    #[serde(default)]
    pub keys: Vec<PublicKey>,
}

impl Keyring {
    /// Create an empty, active keyring.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            keys: Vec::new(),
        }
    }

    /// Add a key to this keyring.
    pub fn with_key(mut self, key: PublicKey) -> Self {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// Mark this keyring inactive.
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }

    /// Fingerprints of every member key.
    pub fn fingerprints(&self) -> impl Iterator<Item = Fingerprint> + '_ {
        self.keys.iter().map(PublicKey::fingerprint)
    }

    /// Whether the key with the given fingerprint is a member.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.fingerprints().any(|member| &member == fingerprint)
    }
}
