use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::Fingerprint;

/// Errors that can occur when parsing a [`Fingerprint`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FingerprintParseError {
    /// The fingerprint does not have exactly 40 hex digits.
    #[error("expected 40 hex digits, got {0}")]
    InvalidLength(usize),

    /// The fingerprint contains a character that is not a hex digit.
    #[error("invalid hex digit '{0}'")]
    InvalidCharacter(char),
}

/// Errors that can occur when parsing a [`crate::PublicKey`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum KeyParseError {
    /// The DID header is invalid.
    #[error("invalid did header")]
    InvalidDidHeader,

    /// The base58 prefix 'z' is missing.
    #[error("missing base58 prefix 'z'")]
    MissingBase58Prefix,

    /// The base58 encoding is invalid.
    #[error("invalid base58 encoding")]
    InvalidBase58,

    /// The key bytes are invalid.
    #[error("invalid key bytes")]
    InvalidKey,
}

/// Errors from loading or generating secret key material.
#[derive(Debug, Error)]
pub enum SecretKeyError {
    /// The seed bytes have the wrong length (expected 32).
    #[error("expected 32 seed bytes, got {0}")]
    InvalidSeedLength(usize),

    /// The seed text is not valid base58.
    #[error("secret key is not valid base58")]
    InvalidEncoding,

    /// Random number generation failed.
    #[error("RNG error: {0}")]
    Rng(getrandom::Error),
}

/// Errors produced while reading the armor of a clearsigned document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArmorError {
    /// The document does not start with the signed-message marker.
    #[error("missing signed message header")]
    MissingBeginMarker,

    /// The armor header is not followed by a blank line.
    #[error("signed message header must be followed by a blank line")]
    MissingHeaderSeparator,

    /// A payload line starts with `-` but is not dash-escaped.
    #[error("line {0} is not correctly dash-escaped")]
    InvalidDashEscape(usize),

    /// The signature block is missing or not terminated.
    #[error("missing or unterminated signature block")]
    MissingSignatureBlock,

    /// A required field is missing from the signature block.
    #[error("signature block is missing the {0} field")]
    MissingField(&'static str),

    /// A field appears more than once in the signature block.
    #[error("signature block repeats the {0} field")]
    DuplicateField(String),

    /// A field in the signature block could not be decoded.
    #[error("invalid {field} field: {reason}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Why it could not be decoded.
        reason: String,
    },
}

/// Errors raised by a [`crate::DocumentVerifier`].
///
/// Each variant is fatal for the document that produced it, and only for
/// that document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The document is malformed, the signature does not match, or its
    /// timestamp cannot be trusted.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// The signature names a key that is not in any active keyring.
    #[error("Unknown signer: {0}")]
    UnknownSigner(Fingerprint),

    /// The signature is valid but older than the freshness window.
    #[error("Stale submission: signed at {signed_at}, freshness window is {max_age_secs}s")]
    StaleSubmission {
        /// When the document was signed.
        signed_at: DateTime<Utc>,
        /// The configured maximum age, in seconds.
        max_age_secs: u64,
    },
}

impl From<ArmorError> for VerificationError {
    fn from(error: ArmorError) -> Self {
        VerificationError::InvalidSignature(error.to_string())
    }
}
