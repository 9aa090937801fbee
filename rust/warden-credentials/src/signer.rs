use chrono::{DateTime, SubsecRound, Utc};

use crate::{ClearSigned, Ed25519Signer};

/// Produces clearsigned documents with a single key.
#[derive(Debug, Clone)]
pub struct ClearSigner {
    key: Ed25519Signer,
}

impl ClearSigner {
    /// Sign with the given key.
    pub fn new(key: Ed25519Signer) -> Self {
        Self { key }
    }

    /// The key used for signing.
    pub fn key(&self) -> &Ed25519Signer {
        &self.key
    }

    /// Clearsign `payload` with the current time as the creation time.
    pub fn sign(&self, payload: &str) -> String {
        self.sign_at(payload, Utc::now())
    }

    /// Clearsign `payload` as of `created`. Sub-second precision is dropped,
    /// since the armor only records whole seconds.
    pub fn sign_at(&self, payload: &str, created: DateTime<Utc>) -> String {
        self.seal(payload, created).encode()
    }

    /// Build the signed document without rendering it.
    pub fn seal(&self, payload: &str, created: DateTime<Utc>) -> ClearSigned {
        let created = created.trunc_subsecs(0);
        let issuer = self.key.fingerprint();
        let payload = crate::normalize_payload(payload);
        let signature = self
            .key
            .sign_bytes(&ClearSigned::signed_message(&payload, &issuer, &created));

        tracing::trace!(%issuer, %created, "clearsigned document");

        ClearSigned {
            payload,
            issuer,
            created,
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn it_produces_documents_that_decode_to_the_same_content() {
        let signer = ClearSigner::new(Ed25519Signer::import(&[4u8; 32]));
        let created = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        let text = signer.sign_at("Source: hello\nVersion: 1.0-1\n", created);

        let decoded = ClearSigned::decode(&text).unwrap();
        assert_eq!(decoded, signer.seal("Source: hello\nVersion: 1.0-1\n", created));
        assert_eq!(decoded.issuer, signer.key().fingerprint());
        assert_eq!(decoded.created, created);
    }

    #[test]
    fn it_drops_sub_second_precision() {
        let signer = ClearSigner::new(Ed25519Signer::import(&[4u8; 32]));
        let created = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let sealed = signer.seal("x", created);
        assert_eq!(sealed.created.timestamp_subsec_nanos(), 0);
        assert!(
            signer
                .key()
                .public_key()
                .verify(&sealed.message(), &sealed.signature)
                .is_ok()
        );
    }
}
