use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use warden_credentials::Fingerprint;

use crate::AclError;

/// A capability flag on an [`Acl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    /// Decide on first-time uploads.
    New,
    /// Decide on entries that carry source.
    Source,
    /// Decide on entries that carry architecture-specific binaries.
    Binary,
    /// Decide on entries that carry architecture-independent binaries.
    BinaryAll,
    /// Decide on entries that carry binaries but no source.
    BinaryOnly,
    /// Decide on packages the signer does not own.
    Hijack,
}

impl Capability {
    /// The name of the flag as it appears in ACL records.
    pub fn flag(&self) -> &'static str {
        match self {
            Capability::New => "allow_new",
            Capability::Source => "allow_source",
            Capability::Binary => "allow_binary",
            Capability::BinaryAll => "allow_binary_all",
            Capability::BinaryOnly => "allow_binary_only",
            Capability::Hijack => "allow_hijack",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag())
    }
}

/// The recipient of a per-source or per-suite grant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grantee {
    /// A single signing key.
    Fingerprint(Fingerprint),
    /// Every key in the named keyring.
    Keyring(String),
}

impl Grantee {
    /// Whether a signer with the given fingerprint and keyring memberships
    /// is covered by this grantee.
    pub fn covers(&self, fingerprint: &Fingerprint, keyrings: &BTreeSet<String>) -> bool {
        match self {
            Grantee::Fingerprint(granted) => granted == fingerprint,
            Grantee::Keyring(name) => keyrings.contains(name),
        }
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::Fingerprint(fingerprint) => write!(f, "{fingerprint}"),
            Grantee::Keyring(name) => write!(f, "keyring:{name}"),
        }
    }
}

impl FromStr for Grantee {
    type Err = AclError;

    /// Accepts `keyring:<name>`, `fpr:<fingerprint>` or a bare fingerprint.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix("keyring:") {
            if name.is_empty() {
                return Err(AclError::InvalidGrantee(s.to_string()));
            }
            return Ok(Grantee::Keyring(name.to_string()));
        }
        let fingerprint = s.strip_prefix("fpr:").unwrap_or(s);
        fingerprint
            .parse()
            .map(Grantee::Fingerprint)
            .map_err(|_| AclError::InvalidGrantee(s.to_string()))
    }
}

impl Serialize for Grantee {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Grantee {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Permission for a grantee to act on one source package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceGrant {
    /// Who holds the grant.
    pub grantee: Grantee,
    /// The source package name.
    pub source: String,
    /// Free-form justification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The key of the operator who made the grant, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Fingerprint>,
    /// When the grant was made.
    pub created: DateTime<Utc>,
}

/// Permission for a grantee to target one destination suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteGrant {
    /// Who holds the grant.
    pub grantee: Grantee,
    /// The suite name.
    pub suite: String,
    /// Free-form justification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The key of the operator who made the grant, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Fingerprint>,
    /// When the grant was made.
    pub created: DateTime<Utc>,
}

/// A named authorization policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Unique ACL name.
    pub name: String,

    /// Permits decisions on first-time uploads.
    #[serde(default)]
    pub allow_new: bool,
    /// Permits decisions on entries carrying source.
    #[serde(default)]
    pub allow_source: bool,
    /// Permits decisions on entries carrying binaries.
    #[serde(default)]
    pub allow_binary: bool,
    /// Permits decisions on entries carrying `all` binaries.
    #[serde(default)]
    pub allow_binary_all: bool,
    /// Permits decisions on binary-only entries.
    #[serde(default)]
    pub allow_binary_only: bool,
    /// Lifts the ownership requirement.
    #[serde(default)]
    pub allow_hijack: bool,

    /// Members of this keyring hold the ACL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_keyring: Option<String>,

    /// Keys that hold the ACL regardless of keyring membership.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub fingerprints: BTreeSet<Fingerprint>,

    /// When set, only sources granted in `per_source` may be acted on.
    #[serde(default)]
    pub allow_per_source: bool,
    /// Per-source grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_source: Vec<SourceGrant>,

    /// When set, only suites granted in `per_suite` may be targeted.
    #[serde(default)]
    pub allow_per_suite: bool,
    /// Per-suite grants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub per_suite: Vec<SuiteGrant>,
}

impl Acl {
    /// An ACL with no capabilities and no members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Enable a capability flag.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        *self.flag_mut(capability) = true;
        self
    }

    /// Enable every capability flag.
    pub fn with_all_capabilities(self) -> Self {
        [
            Capability::New,
            Capability::Source,
            Capability::Binary,
            Capability::BinaryAll,
            Capability::BinaryOnly,
            Capability::Hijack,
        ]
        .into_iter()
        .fold(self, Acl::with_capability)
    }

    /// Members of `keyring` hold this ACL.
    pub fn matching_keyring(mut self, keyring: impl Into<String>) -> Self {
        self.match_keyring = Some(keyring.into());
        self
    }

    /// The key with this fingerprint holds this ACL.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.insert(fingerprint);
        self
    }

    /// Whether the capability flag is set.
    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::New => self.allow_new,
            Capability::Source => self.allow_source,
            Capability::Binary => self.allow_binary,
            Capability::BinaryAll => self.allow_binary_all,
            Capability::BinaryOnly => self.allow_binary_only,
            Capability::Hijack => self.allow_hijack,
        }
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::New => &mut self.allow_new,
            Capability::Source => &mut self.allow_source,
            Capability::Binary => &mut self.allow_binary,
            Capability::BinaryAll => &mut self.allow_binary_all,
            Capability::BinaryOnly => &mut self.allow_binary_only,
            Capability::Hijack => &mut self.allow_hijack,
        }
    }

    /// Whether this ACL grants any action at all. An ACL with none of the
    /// new, source or binary flags is a no-op.
    pub fn grants_any_action(&self) -> bool {
        self.allow_new
            || self.allow_source
            || self.allow_binary
            || self.allow_binary_all
            || self.allow_binary_only
    }

    /// Whether the source is granted to the given signer.
    pub fn source_granted(
        &self,
        source: &str,
        fingerprint: &Fingerprint,
        keyrings: &BTreeSet<String>,
    ) -> bool {
        self.per_source
            .iter()
            .any(|grant| grant.source == source && grant.grantee.covers(fingerprint, keyrings))
    }

    /// Whether the suite is granted to the given signer.
    pub fn suite_granted(
        &self,
        suite: &str,
        fingerprint: &Fingerprint,
        keyrings: &BTreeSet<String>,
    ) -> bool {
        self.per_suite
            .iter()
            .any(|grant| grant.suite == suite && grant.grantee.covers(fingerprint, keyrings))
    }
}

/// A person behind one or more signing keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uid {
    /// Unique login of the person.
    pub uid: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Keys the person signs with.
    #[serde(default)]
    pub fingerprints: BTreeSet<Fingerprint>,
}

impl Uid {
    /// A person with no name and no keys yet.
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: None,
            fingerprints: BTreeSet::new(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a key.
    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.insert(fingerprint);
        self
    }
}

/// Renders as `Name <uid>`.
impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name.as_deref().unwrap_or(""), self.uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fingerprint(byte: u8) -> Fingerprint {
        Fingerprint::from([byte; 20])
    }

    #[test]
    fn it_parses_grantees() {
        assert_eq!(
            "keyring:debian-maintainers".parse::<Grantee>().unwrap(),
            Grantee::Keyring("debian-maintainers".into())
        );
        assert_eq!(
            format!("fpr:{}", fingerprint(0x11)).parse::<Grantee>().unwrap(),
            Grantee::Fingerprint(fingerprint(0x11))
        );
        assert_eq!(
            fingerprint(0x22).to_string().parse::<Grantee>().unwrap(),
            Grantee::Fingerprint(fingerprint(0x22))
        );
        assert!(matches!(
            "keyring:".parse::<Grantee>(),
            Err(AclError::InvalidGrantee(_))
        ));
        assert!(matches!(
            "uid:someone".parse::<Grantee>(),
            Err(AclError::InvalidGrantee(_))
        ));
    }

    #[test]
    fn it_treats_an_acl_without_action_flags_as_a_no_op() {
        let acl = Acl::new("hijackers").with_capability(Capability::Hijack);
        assert!(!acl.grants_any_action());
        assert!(Acl::new("sources").with_capability(Capability::Source).grants_any_action());
    }

    #[test]
    fn it_matches_grants_by_fingerprint_or_keyring() {
        let mut acl = Acl::new("process-upload");
        acl.per_source.push(SourceGrant {
            grantee: Grantee::Keyring("dm".into()),
            source: "foo".into(),
            reason: None,
            created_by: None,
            created: Utc::now(),
        });
        let in_dm = BTreeSet::from(["dm".to_string()]);

        assert!(acl.source_granted("foo", &fingerprint(1), &in_dm));
        assert!(!acl.source_granted("foo", &fingerprint(1), &BTreeSet::new()));
        assert!(!acl.source_granted("bar", &fingerprint(1), &in_dm));
    }

    #[test]
    fn it_reads_acls_with_missing_fields() {
        let acl: Acl =
            serde_json::from_str(r#"{"name":"dm","allow_source":true,"match_keyring":"dm"}"#)
                .unwrap();
        assert!(acl.allow_source);
        assert!(!acl.allow_per_source);
        assert!(acl.per_source.is_empty());
        assert_eq!(acl.match_keyring.as_deref(), Some("dm"));
    }
}
