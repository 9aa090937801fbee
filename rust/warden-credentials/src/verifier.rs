//! Signature verification.
//!
//! Checks happen in a fixed order:
//! 1. Decode the armor
//! 2. Look the issuer up among active keyrings
//! 3. Verify the Ed25519 signature
//! 4. Reject creation times too far in the future
//! 5. Reject signatures older than the freshness window
//!
//! Staleness is only reported for documents whose signature is good, so a
//! forged document never learns anything beyond "invalid".

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{ClearSigned, DocumentDigest, Fingerprint, Keyring, PublicKey, VerificationError};

/// What a successfully verified document tells the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedDocument {
    /// Fingerprint of the key that signed the document.
    pub fingerprint: Fingerprint,
    /// The signed payload.
    pub payload: String,
    /// When the document was signed.
    pub signed_at: DateTime<Utc>,
    /// Identity of the signed statement, independent of its envelope.
    pub digest: DocumentDigest,
}

/// The capability to turn a signed document into a verified payload.
///
/// Command processing only depends on this trait, so tests can substitute a
/// verifier that does no cryptography at all.
#[async_trait]
pub trait DocumentVerifier: Send + Sync {
    /// Verify `document` and return who signed it and what they signed.
    async fn verify(&self, document: &[u8]) -> Result<VerifiedDocument, VerificationError>;
}

/// Time bounds applied to a document's creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    /// Oldest acceptable signature age. `None` disables the check.
    pub max_age: Option<Duration>,
    /// How far in the future a creation time may be before it is rejected.
    pub clock_skew: Duration,
}

impl Default for Freshness {
    fn default() -> Self {
        Self {
            max_age: None,
            clock_skew: Duration::from_secs(300),
        }
    }
}

/// A [`DocumentVerifier`] backed by a set of keyrings.
#[derive(Debug, Clone, Default)]
pub struct KeyringVerifier {
    keys: HashMap<Fingerprint, PublicKey>,
    freshness: Freshness,
}

impl KeyringVerifier {
    /// Trust every key in the given keyrings. Inactive keyrings are skipped.
    pub fn new<'a>(keyrings: impl IntoIterator<Item = &'a Keyring>) -> Self {
        let keys = keyrings
            .into_iter()
            .filter(|keyring| keyring.active)
            .flat_map(|keyring| keyring.keys.iter())
            .map(|key| (key.fingerprint(), *key))
            .collect();
        Self {
            keys,
            freshness: Freshness::default(),
        }
    }

    /// Apply the given freshness bounds.
    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }

    /// Whether a key with this fingerprint is trusted.
    pub fn knows(&self, fingerprint: &Fingerprint) -> bool {
        self.keys.contains_key(fingerprint)
    }

    /// Verify `document` as if the current time were `now`.
    pub fn verify_at(
        &self,
        document: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerifiedDocument, VerificationError> {
        let text = std::str::from_utf8(document).map_err(|error| {
            VerificationError::InvalidSignature(format!("document is not UTF-8: {error}"))
        })?;
        let signed = ClearSigned::decode(text)?;

        let key = self
            .keys
            .get(&signed.issuer)
            .ok_or(VerificationError::UnknownSigner(signed.issuer))?;

        key.verify(&signed.message(), &signed.signature)
            .map_err(|error| VerificationError::InvalidSignature(error.to_string()))?;

        let skew = chrono::Duration::from_std(self.freshness.clock_skew)
            .unwrap_or(chrono::Duration::MAX);
        if now
            .checked_add_signed(skew)
            .is_some_and(|limit| signed.created > limit)
        {
            return Err(VerificationError::InvalidSignature(format!(
                "signature created in the future ({})",
                signed.created
            )));
        }

        if let Some(max_age) = self.freshness.max_age {
            let limit = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
            if now.signed_duration_since(signed.created) > limit {
                return Err(VerificationError::StaleSubmission {
                    signed_at: signed.created,
                    max_age_secs: max_age.as_secs(),
                });
            }
        }

        tracing::debug!(issuer = %signed.issuer, created = %signed.created, "verified document");

        Ok(VerifiedDocument {
            digest: signed.digest(),
            fingerprint: signed.issuer,
            payload: signed.payload,
            signed_at: signed.created,
        })
    }
}

#[async_trait]
impl DocumentVerifier for KeyringVerifier {
    async fn verify(&self, document: &[u8]) -> Result<VerifiedDocument, VerificationError> {
        self.verify_at(document, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClearSigner, Ed25519Signer};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    fn alice() -> Ed25519Signer {
        Ed25519Signer::import(&[1u8; 32])
    }

    fn verifier() -> KeyringVerifier {
        let keyring = Keyring::new("maintainers").with_key(alice().public_key());
        KeyringVerifier::new([&keyring]).with_freshness(Freshness {
            max_age: Some(Duration::from_secs(3600)),
            clock_skew: Duration::from_secs(60),
        })
    }

    #[tokio::test]
    async fn it_verifies_a_document_from_a_known_key() -> anyhow::Result<()> {
        let document = ClearSigner::new(alice()).sign("Action: process-upload\n");
        let verified = verifier().verify(document.as_bytes()).await?;
        assert_eq!(verified.fingerprint, alice().fingerprint());
        assert_eq!(verified.payload, "Action: process-upload\n");
        Ok(())
    }

    #[test]
    fn it_identifies_a_document_by_what_was_signed() -> anyhow::Result<()> {
        let document = ClearSigner::new(alice()).sign_at("Command: REJECT\n", now());
        let original = verifier().verify_at(document.as_bytes(), now())?;

        for rewrapped in [
            format!("X-Mailer: relay\n\n{document}"),
            format!("{document}\n\n"),
            document.replace('\n', "\r\n"),
        ] {
            let verified = verifier().verify_at(rewrapped.as_bytes(), now())?;
            assert_eq!(verified.digest, original.digest);
        }

        let resigned = ClearSigner::new(alice())
            .sign_at("Command: REJECT\n", now() + chrono::Duration::seconds(1));
        let verified = verifier().verify_at(resigned.as_bytes(), now())?;
        assert_ne!(verified.digest, original.digest);
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_signers() {
        let mallory = Ed25519Signer::import(&[2u8; 32]);
        let document = ClearSigner::new(mallory.clone()).sign_at("x", now());
        assert_eq!(
            verifier().verify_at(document.as_bytes(), now()),
            Err(VerificationError::UnknownSigner(mallory.fingerprint()))
        );
    }

    #[test]
    fn it_ignores_inactive_keyrings() {
        let keyring = Keyring::new("emeritus")
            .with_key(alice().public_key())
            .deactivated();
        let verifier = KeyringVerifier::new([&keyring]);
        assert!(!verifier.knows(&alice().fingerprint()));
    }

    #[test]
    fn it_rejects_a_tampered_payload() {
        let document = ClearSigner::new(alice()).sign_at("Command: REJECT", now());
        let tampered = document.replace("REJECT", "ACCEPT");
        assert!(matches!(
            verifier().verify_at(tampered.as_bytes(), now()),
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn it_rejects_a_forged_issuer() {
        let bob = Ed25519Signer::import(&[3u8; 32]);
        let keyring = Keyring::new("maintainers")
            .with_key(alice().public_key())
            .with_key(bob.public_key());
        let verifier = KeyringVerifier::new([&keyring]);

        let document = ClearSigner::new(alice()).sign_at("x", now());
        let forged = document.replace(
            &alice().fingerprint().to_string(),
            &bob.fingerprint().to_string(),
        );
        assert!(matches!(
            verifier.verify_at(forged.as_bytes(), now()),
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn it_reports_stale_submissions_after_checking_the_signature() {
        let signed_at = now() - chrono::Duration::hours(2);
        let document = ClearSigner::new(alice()).sign_at("x", signed_at);
        assert_eq!(
            verifier().verify_at(document.as_bytes(), now()),
            Err(VerificationError::StaleSubmission {
                signed_at,
                max_age_secs: 3600
            })
        );

        let tampered = document.replace("\nx\n", "\ny\n");
        assert!(matches!(
            verifier().verify_at(tampered.as_bytes(), now()),
            Err(VerificationError::InvalidSignature(_))
        ));
    }

    #[test]
    fn it_rejects_signatures_from_the_future() {
        let document =
            ClearSigner::new(alice()).sign_at("x", now() + chrono::Duration::minutes(10));
        assert!(matches!(
            verifier().verify_at(document.as_bytes(), now()),
            Err(VerificationError::InvalidSignature(_))
        ));

        let within_skew =
            ClearSigner::new(alice()).sign_at("x", now() + chrono::Duration::seconds(30));
        assert!(verifier().verify_at(within_skew.as_bytes(), now()).is_ok());
    }

    #[test]
    fn it_rejects_documents_that_are_not_text() {
        assert!(matches!(
            verifier().verify_at(&[0xff, 0xfe], now()),
            Err(VerificationError::InvalidSignature(_))
        ));
    }
}
