use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::FingerprintParseError;

/// The size of a key fingerprint in bytes.
pub const FINGERPRINT_SIZE: usize = 20;

/// Identifies a public signing key.
///
/// A fingerprint is the first 20 bytes of the SHA-256 digest of the raw
/// public key. It is displayed as 40 uppercase hex digits. Parsing accepts
/// either case and ignores embedded whitespace, so the grouped
/// `1234 ABCD ...` spelling operators tend to paste is accepted too.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Computes the fingerprint of raw public key bytes.
    pub fn of_key(key: &[u8]) -> Self {
        let digest = Sha256::digest(key);
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes.copy_from_slice(&digest[..FINGERPRINT_SIZE]);
        Self(bytes)
    }

    /// The raw fingerprint bytes.
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }
}

impl From<[u8; FINGERPRINT_SIZE]> for Fingerprint {
    fn from(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();

        if let Some(bad) = digits.iter().find(|c| !c.is_ascii_hexdigit()) {
            return Err(FingerprintParseError::InvalidCharacter(*bad));
        }
        if digits.len() != FINGERPRINT_SIZE * 2 {
            return Err(FingerprintParseError::InvalidLength(digits.len()));
        }

        let mut bytes = [0u8; FINGERPRINT_SIZE];
        for (byte, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
            let high = pair[0].to_digit(16).unwrap_or_default();
            let low = pair[1].to_digit(16).unwrap_or_default();
            *byte = (high * 16 + low) as u8;
        }

        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
