//! The clearsigned document format.
//!
//! ```text
//! -----BEGIN WARDEN SIGNED MESSAGE-----
//!
//! Action: process-upload
//! - --- dash-escaped payload line
//! -----BEGIN WARDEN SIGNATURE-----
//! Issuer: 0123456789ABCDEF0123456789ABCDEF01234567
//! Created: 2026-10-18T09:30:00Z
//! Signature: <base64>
//! -----END WARDEN SIGNATURE-----
//! ```
//!
//! The payload stays human readable. Payload lines starting with `-` are
//! escaped with a `- ` prefix so they cannot be confused with the armor
//! markers. Trailing whitespace on payload lines is not significant.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::Signature;

use crate::{ArmorError, DocumentDigest, Fingerprint};

/// First line of a clearsigned document.
pub const BEGIN_MESSAGE: &str = "-----BEGIN WARDEN SIGNED MESSAGE-----";
/// Separates the payload from the signature block.
pub const BEGIN_SIGNATURE: &str = "-----BEGIN WARDEN SIGNATURE-----";
/// Last line of a clearsigned document.
pub const END_SIGNATURE: &str = "-----END WARDEN SIGNATURE-----";

const SIGNED_MESSAGE_DOMAIN: &str = "warden-clearsign-v1";

/// A decoded clearsigned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearSigned {
    /// The signed payload, normalized (see [`normalize_payload`]).
    pub payload: String,
    /// Fingerprint of the key that produced the signature.
    pub issuer: Fingerprint,
    /// When the signature was made, at second precision.
    pub created: DateTime<Utc>,
    /// The Ed25519 signature over [`ClearSigned::signed_message`].
    pub signature: Signature,
}

/// Normalizes payload text the way it is signed: line endings become `\n`
/// and trailing whitespace is dropped from every line.
pub fn normalize_payload(payload: &str) -> String {
    payload
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_created(created: &DateTime<Utc>) -> String {
    created.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ClearSigned {
    /// The exact bytes covered by the signature.
    ///
    /// The issuer and creation time are bound into the message, so neither
    /// can be swapped without invalidating the signature.
    pub fn signed_message(payload: &str, issuer: &Fingerprint, created: &DateTime<Utc>) -> Vec<u8> {
        format!(
            "{SIGNED_MESSAGE_DOMAIN}\n{issuer}\n{}\n{}",
            format_created(created),
            normalize_payload(payload)
        )
        .into_bytes()
    }

    /// The bytes this document's signature must cover.
    pub fn message(&self) -> Vec<u8> {
        Self::signed_message(&self.payload, &self.issuer, &self.created)
    }

    /// The identity of this signed statement: a digest over the signed
    /// message and the signature.
    ///
    /// Text outside the armor, line endings and trailing whitespace do not
    /// change it, so a rewrapped copy of a document has the same digest as
    /// the original.
    pub fn digest(&self) -> DocumentDigest {
        let signature = self.signature.to_bytes();
        DocumentDigest::hash_all([self.message().as_slice(), signature.as_slice()])
    }

    /// Render the document as armored text.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push_str(BEGIN_MESSAGE);
        out.push_str("\n\n");
        for line in normalize_payload(&self.payload).split('\n') {
            if line.starts_with('-') {
                out.push_str("- ");
            }
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(BEGIN_SIGNATURE);
        out.push('\n');
        out.push_str(&format!("Issuer: {}\n", self.issuer));
        out.push_str(&format!("Created: {}\n", format_created(&self.created)));
        out.push_str(&format!(
            "Signature: {}\n",
            BASE64.encode(self.signature.to_bytes())
        ));
        out.push_str(END_SIGNATURE);
        out.push('\n');
        out
    }

    /// Parse armored text. This checks structure only; the signature itself
    /// is checked by a [`crate::DocumentVerifier`].
    pub fn decode(text: &str) -> Result<Self, ArmorError> {
        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));

        // Anything before the header (mail headers, blank lines) is ignored.
        lines
            .by_ref()
            .find(|line| line.trim_end() == BEGIN_MESSAGE)
            .ok_or(ArmorError::MissingBeginMarker)?;

        match lines.next() {
            Some(line) if line.trim().is_empty() => {}
            _ => return Err(ArmorError::MissingHeaderSeparator),
        }

        let mut payload = Vec::new();
        let mut terminated = false;
        for (index, line) in lines.by_ref().enumerate() {
            let line = line.trim_end();
            if line == BEGIN_SIGNATURE {
                terminated = true;
                break;
            }
            if let Some(escaped) = line.strip_prefix("- ") {
                payload.push(escaped);
            } else if line.starts_with('-') {
                return Err(ArmorError::InvalidDashEscape(index + 1));
            } else {
                payload.push(line);
            }
        }
        if !terminated {
            return Err(ArmorError::MissingSignatureBlock);
        }

        let mut issuer = None;
        let mut created = None;
        let mut signature = None;
        let mut terminated = false;
        for line in lines {
            let line = line.trim();
            if line == END_SIGNATURE {
                terminated = true;
                break;
            }
            if line.is_empty() {
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| ArmorError::InvalidField {
                field: "signature block",
                reason: format!("unexpected line '{line}'"),
            })?;
            let value = value.trim();
            match name.trim() {
                "Issuer" => {
                    let parsed = value.parse().map_err(|error| ArmorError::InvalidField {
                        field: "Issuer",
                        reason: format!("{error}"),
                    })?;
                    set_once(&mut issuer, parsed, "Issuer")?;
                }
                "Created" => {
                    let parsed = DateTime::parse_from_rfc3339(value)
                        .map_err(|error| ArmorError::InvalidField {
                            field: "Created",
                            reason: format!("{error}"),
                        })?
                        .with_timezone(&Utc);
                    set_once(&mut created, parsed, "Created")?;
                }
                "Signature" => {
                    let bytes = BASE64.decode(value).map_err(|error| ArmorError::InvalidField {
                        field: "Signature",
                        reason: format!("{error}"),
                    })?;
                    let parsed = Signature::from_slice(&bytes).map_err(|error| {
                        ArmorError::InvalidField {
                            field: "Signature",
                            reason: format!("{error}"),
                        }
                    })?;
                    set_once(&mut signature, parsed, "Signature")?;
                }
                // Unknown fields are tolerated for forward compatibility.
                _ => {}
            }
        }
        if !terminated {
            return Err(ArmorError::MissingSignatureBlock);
        }

        Ok(Self {
            payload: payload.join("\n"),
            issuer: issuer.ok_or(ArmorError::MissingField("Issuer"))?,
            created: created.ok_or(ArmorError::MissingField("Created"))?,
            signature: signature.ok_or(ArmorError::MissingField("Signature"))?,
        })
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &str) -> Result<(), ArmorError> {
    if slot.is_some() {
        return Err(ArmorError::DuplicateField(field.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClearSigner, Ed25519Signer};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn signed(payload: &str) -> String {
        let created = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        ClearSigner::new(Ed25519Signer::import(&[1u8; 32])).sign_at(payload, created)
    }

    #[test]
    fn it_dash_escapes_payload_lines() {
        let text = signed("Action: process-upload\n---\n");
        assert!(text.contains("\n- ---\n"));
        let decoded = ClearSigned::decode(&text).unwrap();
        assert_eq!(decoded.payload, "Action: process-upload\n---\n");
    }

    #[test]
    fn it_normalizes_line_endings_and_trailing_space() {
        assert_eq!(normalize_payload("a  \r\nb\t\n"), "a\nb\n");
    }

    #[test]
    fn it_ignores_text_before_the_header() {
        let text = format!("From: someone\n\n{}", signed("Source: foo"));
        let decoded = ClearSigned::decode(&text).unwrap();
        assert_eq!(decoded.payload, "Source: foo");
    }

    #[test]
    fn it_rejects_documents_without_a_header() {
        assert_eq!(
            ClearSigned::decode("Action: process-upload\n"),
            Err(ArmorError::MissingBeginMarker)
        );
    }

    #[test]
    fn it_rejects_unescaped_dash_lines() {
        let text = signed("ok").replace("\nok\n", "\n-oops\n");
        assert_eq!(
            ClearSigned::decode(&text),
            Err(ArmorError::InvalidDashEscape(1))
        );
    }

    #[test]
    fn it_requires_a_signature_block() {
        let text = format!("{BEGIN_MESSAGE}\n\nAction: process-upload\n");
        assert_eq!(
            ClearSigned::decode(&text),
            Err(ArmorError::MissingSignatureBlock)
        );
    }

    #[test]
    fn it_requires_every_signature_field() {
        let text = signed("ok");
        let without_issuer: String = text
            .lines()
            .filter(|line| !line.starts_with("Issuer:"))
            .map(|line| format!("{line}\n"))
            .collect();
        assert_eq!(
            ClearSigned::decode(&without_issuer),
            Err(ArmorError::MissingField("Issuer"))
        );
    }

    #[test]
    fn it_rejects_repeated_fields() {
        let text = signed("ok");
        let created = text
            .lines()
            .find(|line| line.starts_with("Created:"))
            .unwrap()
            .to_string();
        let repeated = text.replace(&created, &format!("{created}\n{created}"));
        assert_eq!(
            ClearSigned::decode(&repeated),
            Err(ArmorError::DuplicateField("Created".into()))
        );
    }
}
