use thiserror::Error;
use warden_credentials::Fingerprint;

/// Errors from reading, writing or administering access control tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    /// No ACL with this name exists.
    #[error("unknown ACL '{0}'")]
    UnknownAcl(String),

    /// No keyring with this name exists.
    #[error("unknown keyring '{0}'")]
    UnknownKeyring(String),

    /// The fingerprint is not a member of any active keyring.
    #[error("unknown key {0}")]
    UnknownFingerprint(Fingerprint),

    /// The suite is not in the suite catalog.
    #[error("unknown suite '{0}'")]
    UnknownSuite(String),

    /// A grantee could not be parsed.
    #[error("invalid grantee '{0}'")]
    InvalidGrantee(String),

    /// An ACL or keyring name is used twice.
    #[error("duplicate name '{0}'")]
    DuplicateName(String),

    /// The table could not be decoded or encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The table could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),
}
