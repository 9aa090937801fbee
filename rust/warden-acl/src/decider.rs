//! The authorization decision.
//!
//! Each held ACL is checked through four gates, in order:
//!
//! 1. capability: the ACL's flags cover every class of artifact in the entry
//! 2. source: if the ACL restricts sources, the source is granted to the signer
//! 3. suite: if the ACL restricts suites, the destination is granted to the signer
//! 4. ownership: unless the ACL allows hijacking, the signer owns the entry
//!
//! The directive is permitted if any ACL passes all four. When none does,
//! the failure that got furthest through the gates is reported.

use std::collections::BTreeSet;

use thiserror::Error;
use warden_credentials::Fingerprint;

use crate::{Acl, Capability};

/// What a queue entry looks like to the decider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationTarget {
    /// Source package name.
    pub source: String,
    /// The suite the entry will land in: the override redirect if there is
    /// one, otherwise the nominal suite.
    pub suite: String,
    /// Whether the entry is a first-time upload.
    pub new: bool,
    /// Whether the entry carries source.
    pub has_source: bool,
    /// Whether the entry carries any binaries.
    pub has_binaries: bool,
    /// Whether the entry carries architecture-independent binaries.
    pub has_arch_all: bool,
    /// The uploader and maintainers of record.
    pub owners: BTreeSet<Fingerprint>,
}

impl AuthorizationTarget {
    /// The capability flags an ACL needs for this entry.
    ///
    /// An entry that carries nothing is treated like a source upload.
    pub fn required_capabilities(&self) -> Vec<Capability> {
        let mut required = Vec::new();
        if self.new {
            required.push(Capability::New);
        }
        if self.has_source {
            required.push(Capability::Source);
        }
        if self.has_binaries {
            required.push(Capability::Binary);
            if !self.has_source {
                required.push(Capability::BinaryOnly);
            }
        }
        if self.has_arch_all {
            required.push(Capability::BinaryAll);
        }
        if !self.has_source && !self.has_binaries {
            required.push(Capability::Source);
        }
        required
    }
}

/// A granted decision, naming the ACL that granted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    /// Name of the permitting ACL.
    pub acl: String,
}

/// The gates an ACL is checked against, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Gate {
    /// Capability flags.
    Capability,
    /// Per-source grants.
    Source,
    /// Per-suite grants.
    Suite,
    /// Ownership, lifted by `allow_hijack`.
    Ownership,
}

/// Why a directive was not permitted.
///
/// Denials are an expected outcome, not a failure of the system, and every
/// one names the gate that stopped it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    /// No held ACL has a required capability flag. `acl` is `None` when the
    /// signer holds no ACL at all.
    #[error("capability {capability} not granted{}", for_acl(.acl))]
    CapabilityNotGranted {
        /// The ACL that was checked, if any.
        acl: Option<String>,
        /// The missing flag.
        capability: Capability,
    },

    /// The ACL restricts sources and this source is not granted.
    #[error("source '{source_name}' not allowed by ACL {acl}")]
    SourceNotAllowed {
        /// The denying ACL.
        acl: String,
        /// The source package.
        source_name: String,
    },

    /// The ACL restricts suites and this destination is not granted.
    #[error("suite '{suite}' not allowed by ACL {acl}")]
    SuiteNotAllowed {
        /// The denying ACL.
        acl: String,
        /// The destination suite.
        suite: String,
    },

    /// The signer does not own the entry and the ACL does not allow
    /// hijacking.
    #[error("signer does not own '{source_name}' and ACL {acl} does not allow hijacking")]
    NotOwner {
        /// The denying ACL.
        acl: String,
        /// The source package.
        source_name: String,
    },
}

fn for_acl(acl: &Option<String>) -> String {
    match acl {
        Some(name) => format!(" by ACL {name}"),
        None => " (signer holds no ACL)".to_string(),
    }
}

impl Denial {
    /// The gate that produced this denial.
    pub fn gate(&self) -> Gate {
        match self {
            Denial::CapabilityNotGranted { .. } => Gate::Capability,
            Denial::SourceNotAllowed { .. } => Gate::Source,
            Denial::SuiteNotAllowed { .. } => Gate::Suite,
            Denial::NotOwner { .. } => Gate::Ownership,
        }
    }
}

/// Check a single ACL.
pub fn check_acl(
    acl: &Acl,
    fingerprint: &Fingerprint,
    keyrings: &BTreeSet<String>,
    target: &AuthorizationTarget,
) -> Result<Permit, Denial> {
    let missing = target
        .required_capabilities()
        .into_iter()
        .find(|capability| !acl.has(*capability));
    if let Some(capability) = missing {
        return Err(Denial::CapabilityNotGranted {
            acl: Some(acl.name.clone()),
            capability,
        });
    }

    if acl.allow_per_source && !acl.source_granted(&target.source, fingerprint, keyrings) {
        return Err(Denial::SourceNotAllowed {
            acl: acl.name.clone(),
            source_name: target.source.clone(),
        });
    }

    if acl.allow_per_suite && !acl.suite_granted(&target.suite, fingerprint, keyrings) {
        return Err(Denial::SuiteNotAllowed {
            acl: acl.name.clone(),
            suite: target.suite.clone(),
        });
    }

    if !acl.allow_hijack && !target.owners.contains(fingerprint) {
        return Err(Denial::NotOwner {
            acl: acl.name.clone(),
            source_name: target.source.clone(),
        });
    }

    Ok(Permit {
        acl: acl.name.clone(),
    })
}

/// Decide over every ACL the signer holds.
pub fn decide(
    fingerprint: &Fingerprint,
    keyrings: &BTreeSet<String>,
    acls: &[&Acl],
    target: &AuthorizationTarget,
) -> Result<Permit, Denial> {
    let mut deepest: Option<Denial> = None;

    for acl in acls {
        match check_acl(acl, fingerprint, keyrings, target) {
            Ok(permit) => {
                tracing::debug!(acl = %permit.acl, source = %target.source, "permitted");
                return Ok(permit);
            }
            Err(denial) => {
                tracing::trace!(acl = %acl.name, %denial, "ACL does not permit");
                if deepest
                    .as_ref()
                    .is_none_or(|current| denial.gate() > current.gate())
                {
                    deepest = Some(denial);
                }
            }
        }
    }

    Err(deepest.unwrap_or_else(|| Denial::CapabilityNotGranted {
        acl: None,
        capability: target
            .required_capabilities()
            .first()
            .copied()
            .unwrap_or(Capability::Source),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Grantee, SourceGrant, SuiteGrant};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn alice() -> Fingerprint {
        Fingerprint::from([0xaa; 20])
    }

    fn bob() -> Fingerprint {
        Fingerprint::from([0xbb; 20])
    }

    fn source_upload(owner: Fingerprint) -> AuthorizationTarget {
        AuthorizationTarget {
            source: "foo".into(),
            suite: "unstable".into(),
            has_source: true,
            owners: BTreeSet::from([owner]),
            ..Default::default()
        }
    }

    fn source_grant(grantee: Grantee, source: &str) -> SourceGrant {
        SourceGrant {
            grantee,
            source: source.into(),
            reason: None,
            created_by: None,
            created: Utc::now(),
        }
    }

    fn no_keyrings() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn it_denies_signers_without_acls() {
        assert_eq!(
            decide(&alice(), &no_keyrings(), &[], &source_upload(alice())),
            Err(Denial::CapabilityNotGranted {
                acl: None,
                capability: Capability::Source
            })
        );
    }

    #[test]
    fn it_requires_capabilities_for_every_artifact_class() {
        let target = AuthorizationTarget {
            has_binaries: true,
            has_arch_all: true,
            new: true,
            ..source_upload(alice())
        };
        assert_eq!(
            target.required_capabilities(),
            vec![
                Capability::New,
                Capability::Source,
                Capability::Binary,
                Capability::BinaryAll
            ]
        );

        let acl = Acl::new("binaries").with_capability(Capability::Binary);
        let binary_only = AuthorizationTarget {
            has_source: false,
            has_binaries: true,
            ..source_upload(alice())
        };
        assert_eq!(
            check_acl(&acl, &alice(), &no_keyrings(), &binary_only),
            Err(Denial::CapabilityNotGranted {
                acl: Some("binaries".into()),
                capability: Capability::BinaryOnly
            })
        );
    }

    #[test]
    fn it_treats_an_acl_without_action_flags_as_granting_nothing() {
        let acl = Acl::new("hijack-only").with_capability(Capability::Hijack);
        let empty = AuthorizationTarget {
            has_source: false,
            ..source_upload(alice())
        };
        assert!(matches!(
            check_acl(&acl, &alice(), &no_keyrings(), &empty),
            Err(Denial::CapabilityNotGranted { .. })
        ));
    }

    #[test]
    fn it_denies_sources_missing_from_a_restricted_acl() {
        let mut acl = Acl::new("process-upload").with_all_capabilities();
        acl.allow_per_source = true;
        acl.per_source.push(source_grant(Grantee::Fingerprint(bob()), "foo"));

        assert_eq!(
            check_acl(&acl, &alice(), &no_keyrings(), &source_upload(alice())),
            Err(Denial::SourceNotAllowed {
                acl: "process-upload".into(),
                source_name: "foo".into()
            })
        );

        acl.per_source.push(source_grant(Grantee::Fingerprint(alice()), "foo"));
        assert!(check_acl(&acl, &alice(), &no_keyrings(), &source_upload(alice())).is_ok());
    }

    #[test]
    fn it_denies_everything_for_a_restricted_acl_with_no_grants() {
        let mut acl = Acl::new("process-upload").with_all_capabilities();
        acl.allow_per_source = true;
        assert!(matches!(
            check_acl(&acl, &alice(), &no_keyrings(), &source_upload(alice())),
            Err(Denial::SourceNotAllowed { .. })
        ));
    }

    #[test]
    fn it_honors_source_grants_made_to_keyrings() {
        let mut acl = Acl::new("dm").with_capability(Capability::Source);
        acl.allow_per_source = true;
        acl.per_source
            .push(source_grant(Grantee::Keyring("dm".into()), "foo"));
        let keyrings = BTreeSet::from(["dm".to_string()]);
        assert!(check_acl(&acl, &alice(), &keyrings, &source_upload(alice())).is_ok());
    }

    #[test]
    fn it_denies_suites_missing_from_a_restricted_acl() {
        let mut acl = Acl::new("stable-updates").with_all_capabilities();
        acl.allow_per_suite = true;
        acl.per_suite.push(SuiteGrant {
            grantee: Grantee::Fingerprint(alice()),
            suite: "stable".into(),
            reason: None,
            created_by: None,
            created: Utc::now(),
        });
        assert_eq!(
            check_acl(&acl, &alice(), &no_keyrings(), &source_upload(alice())),
            Err(Denial::SuiteNotAllowed {
                acl: "stable-updates".into(),
                suite: "unstable".into()
            })
        );
    }

    #[test]
    fn it_requires_ownership_unless_hijacking_is_allowed() {
        let acl = Acl::new("dm").with_capability(Capability::Source);
        assert_eq!(
            check_acl(&acl, &alice(), &no_keyrings(), &source_upload(bob())),
            Err(Denial::NotOwner {
                acl: "dm".into(),
                source_name: "foo".into()
            })
        );

        let acl = acl.with_capability(Capability::Hijack);
        assert!(check_acl(&acl, &alice(), &no_keyrings(), &source_upload(bob())).is_ok());
    }

    #[test]
    fn it_does_not_let_hijacking_bypass_source_restrictions() {
        let mut acl = Acl::new("ftpmaster").with_all_capabilities();
        acl.allow_per_source = true;
        assert!(matches!(
            check_acl(&acl, &alice(), &no_keyrings(), &source_upload(bob())),
            Err(Denial::SourceNotAllowed { .. })
        ));
    }

    #[test]
    fn it_permits_when_any_acl_permits() {
        let narrow = Acl::new("narrow").with_capability(Capability::Binary);
        let broad = Acl::new("broad").with_all_capabilities();
        assert_eq!(
            decide(
                &alice(),
                &no_keyrings(),
                &[&narrow, &broad],
                &source_upload(bob())
            ),
            Ok(Permit {
                acl: "broad".into()
            })
        );
    }

    #[test]
    fn it_reports_the_most_specific_denial() {
        let narrow = Acl::new("narrow").with_capability(Capability::Binary);
        let mut restricted = Acl::new("restricted").with_all_capabilities();
        restricted.allow_per_source = true;

        for acls in [[&narrow, &restricted], [&restricted, &narrow]] {
            assert!(matches!(
                decide(&alice(), &no_keyrings(), &acls, &source_upload(alice())),
                Err(Denial::SourceNotAllowed { .. })
            ));
        }
    }

    #[test]
    fn it_names_the_failing_gate_in_messages() {
        let denial = Denial::CapabilityNotGranted {
            acl: None,
            capability: Capability::New,
        };
        assert_eq!(
            denial.to_string(),
            "capability allow_new not granted (signer holds no ACL)"
        );
        let denial = Denial::SourceNotAllowed {
            acl: "process-upload".into(),
            source_name: "foo".into(),
        };
        assert_eq!(
            denial.to_string(),
            "source 'foo' not allowed by ACL process-upload"
        );
    }
}
