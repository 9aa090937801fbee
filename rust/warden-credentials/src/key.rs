//! Ed25519 key material.

use std::{fmt, str::FromStr};

use base58::{FromBase58, ToBase58};
use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Fingerprint, KeyParseError, SecretKeyError};

const DID_KEY_PREFIX: &str = "did:key:z";
const ED25519_PUB: [u8; 2] = [0xed, 0x01];

/// An Ed25519 public key, written as a `did:key` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// The fingerprint identifying this key.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_key(self.0.as_bytes())
    }

    /// Get the raw public key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Verify a signature for the given message.
    ///
    /// # Errors
    ///
    /// Returns `signature::Error` if verification fails.
    pub fn verify(&self, msg: &[u8], signature: &Signature) -> Result<(), signature::Error> {
        self.0.verify_strict(msg, signature)
    }
}

impl From<VerifyingKey> for PublicKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut raw_bytes = Vec::with_capacity(34);
        raw_bytes.extend_from_slice(&ED25519_PUB);
        raw_bytes.extend_from_slice(self.0.as_bytes());
        write!(f, "{DID_KEY_PREFIX}{}", raw_bytes.to_base58())
    }
}

impl FromStr for PublicKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || parts[0] != "did" || parts[1] != "key" {
            return Err(KeyParseError::InvalidDidHeader);
        }
        let b58 = parts[2]
            .strip_prefix('z')
            .ok_or(KeyParseError::MissingBase58Prefix)?;
        let key_bytes = b58.from_base58().map_err(|_| KeyParseError::InvalidBase58)?;
        let raw = <[u8; 34]>::try_from(key_bytes.as_slice())
            .map_err(|_| KeyParseError::InvalidKey)?;
        if raw[..2] != ED25519_PUB {
            return Err(KeyParseError::InvalidKey);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&raw[2..]);
        let key = VerifyingKey::from_bytes(&key).map_err(|_| KeyParseError::InvalidKey)?;
        Ok(Self(key))
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// An Ed25519 signing key.
#[derive(Debug, Clone)]
pub struct Ed25519Signer(SigningKey);

impl Ed25519Signer {
    /// Generate a new Ed25519 keypair from operating system randomness.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails.
    pub fn generate() -> Result<Self, SecretKeyError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(SecretKeyError::Rng)?;
        Ok(Self(SigningKey::from_bytes(&seed)))
    }

    /// Import a keypair from its 32-byte seed.
    pub fn import(seed: &[u8; 32]) -> Self {
        Self(SigningKey::from_bytes(seed))
    }

    /// Import a keypair from its base58-encoded seed, as written by
    /// [`Ed25519Signer::export`].
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not base58 or not 32 bytes long.
    pub fn from_base58(text: &str) -> Result<Self, SecretKeyError> {
        let bytes = text
            .trim()
            .from_base58()
            .map_err(|_| SecretKeyError::InvalidEncoding)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SecretKeyError::InvalidSeedLength(bytes.len()))?;
        Ok(Self::import(&seed))
    }

    /// Export the seed, base58-encoded.
    pub fn export(&self) -> String {
        self.0.to_bytes().to_base58()
    }

    /// The public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// The fingerprint of the public half of this keypair.
    pub fn fingerprint(&self) -> Fingerprint {
        self.public_key().fingerprint()
    }

    /// Sign a message.
    pub fn sign_bytes(&self, msg: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        self.0.sign(msg)
    }
}

impl From<SigningKey> for Ed25519Signer {
    fn from(key: SigningKey) -> Self {
        Self(key)
    }
}
