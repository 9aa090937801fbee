//! Operator-facing changes to an [`AccessControlTable`].
//!
//! These never take part in a decision; they only edit the table that later
//! snapshots are built from.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
};

use chrono::{DateTime, Utc};
use warden_credentials::Fingerprint;

use crate::{AccessControlTable, AclError, Grantee, SourceGrant, SuiteGrant};

/// Bookkeeping recorded with a grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantContext {
    /// Why the grant is made.
    pub reason: Option<String>,
    /// Who is making the grant.
    pub created_by: Option<Fingerprint>,
    /// When the grant is made.
    pub created: DateTime<Utc>,
}

impl GrantContext {
    /// A context stamped with the current time.
    pub fn now(reason: Option<String>) -> Self {
        Self {
            reason,
            created_by: None,
            created: Utc::now(),
        }
    }
}

/// The effect of granting one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantChange {
    /// The grant was added.
    Added(String),
    /// An identical grant already existed.
    AlreadyGranted(String),
}

/// The effect of revoking one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevokeChange {
    /// The grant was removed.
    Removed(String),
    /// There was nothing to remove. Worth a warning, not an error.
    NotGranted(String),
}

/// Outcome of [`AccessControlTable::set_fingerprints`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintUpdate {
    /// The new explicit member set.
    pub fingerprints: BTreeSet<Fingerprint>,
    /// Entries that did not resolve to any known key.
    pub unknown: Vec<String>,
}

/// One grantee's grants in an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    /// The grantee.
    pub grantee: Grantee,
    /// `Name <uid>` of the person holding a fingerprint grantee, if known.
    pub uid: Option<String>,
    /// Granted items, each with the creator's fingerprint when recorded.
    pub allow: Vec<(String, Option<Fingerprint>)>,
}

/// Render export records in the deb822-style format operators are used to.
pub fn render_export(records: &[ExportRecord]) -> String {
    let mut out = String::new();
    for record in records {
        match &record.grantee {
            Grantee::Fingerprint(fingerprint) => {
                let _ = writeln!(out, "Fingerprint: {fingerprint}");
                if let Some(uid) = &record.uid {
                    let _ = writeln!(out, "Uid: {uid}");
                }
            }
            Grantee::Keyring(name) => {
                let _ = writeln!(out, "Keyring: {name}");
            }
        }
        let allow: Vec<String> = record
            .allow
            .iter()
            .map(|(item, created_by)| match created_by {
                Some(creator) => format!("{item} ({creator})"),
                None => item.clone(),
            })
            .collect();
        let _ = writeln!(out, "Allow: {}", allow.join(",\n "));
        out.push('\n');
    }
    out
}

impl AccessControlTable {
    fn check_grantee(&self, grantee: &Grantee) -> Result<(), AclError> {
        match grantee {
            Grantee::Fingerprint(fingerprint) if !self.knows(fingerprint) => {
                Err(AclError::UnknownFingerprint(*fingerprint))
            }
            Grantee::Keyring(name) => self.keyring(name).map(|_| ()),
            Grantee::Fingerprint(_) => Ok(()),
        }
    }

    /// Grant per-source rights under an ACL.
    pub fn allow(
        &mut self,
        acl: &str,
        grantee: &Grantee,
        sources: &[String],
        context: &GrantContext,
    ) -> Result<Vec<GrantChange>, AclError> {
        self.check_grantee(grantee)?;
        let acl = self.acl_mut(acl)?;

        let mut changes = Vec::with_capacity(sources.len());
        for source in sources {
            let exists = acl
                .per_source
                .iter()
                .any(|grant| &grant.grantee == grantee && &grant.source == source);
            if exists {
                changes.push(GrantChange::AlreadyGranted(source.clone()));
                continue;
            }
            acl.per_source.push(SourceGrant {
                grantee: grantee.clone(),
                source: source.clone(),
                reason: context.reason.clone(),
                created_by: context.created_by,
                created: context.created,
            });
            tracing::info!(acl = %acl.name, %grantee, %source, "granted source");
            changes.push(GrantChange::Added(source.clone()));
        }
        Ok(changes)
    }

    /// Revoke per-source rights under an ACL.
    pub fn deny(
        &mut self,
        acl: &str,
        grantee: &Grantee,
        sources: &[String],
    ) -> Result<Vec<RevokeChange>, AclError> {
        let acl = self.acl_mut(acl)?;
        let mut changes = Vec::with_capacity(sources.len());
        for source in sources {
            let before = acl.per_source.len();
            acl.per_source
                .retain(|grant| !(&grant.grantee == grantee && &grant.source == source));
            if acl.per_source.len() < before {
                tracing::info!(acl = %acl.name, %grantee, %source, "revoked source");
                changes.push(RevokeChange::Removed(source.clone()));
            } else {
                tracing::warn!(
                    acl = %acl.name,
                    %grantee,
                    %source,
                    "tried to deny uploads of a source that was not allowed before"
                );
                changes.push(RevokeChange::NotGranted(source.clone()));
            }
        }
        Ok(changes)
    }

    /// Grant per-suite rights under an ACL. Every suite must be in
    /// `known_suites`.
    pub fn allow_suite(
        &mut self,
        acl: &str,
        grantee: &Grantee,
        suites: &[String],
        known_suites: &BTreeSet<String>,
        context: &GrantContext,
    ) -> Result<Vec<GrantChange>, AclError> {
        self.check_grantee(grantee)?;
        if let Some(unknown) = suites.iter().find(|suite| !known_suites.contains(*suite)) {
            return Err(AclError::UnknownSuite(unknown.clone()));
        }
        let acl = self.acl_mut(acl)?;

        let mut changes = Vec::with_capacity(suites.len());
        for suite in suites {
            let exists = acl
                .per_suite
                .iter()
                .any(|grant| &grant.grantee == grantee && &grant.suite == suite);
            if exists {
                changes.push(GrantChange::AlreadyGranted(suite.clone()));
                continue;
            }
            acl.per_suite.push(SuiteGrant {
                grantee: grantee.clone(),
                suite: suite.clone(),
                reason: context.reason.clone(),
                created_by: context.created_by,
                created: context.created,
            });
            tracing::info!(acl = %acl.name, %grantee, %suite, "granted suite");
            changes.push(GrantChange::Added(suite.clone()));
        }
        Ok(changes)
    }

    /// Revoke per-suite rights under an ACL.
    pub fn deny_suite(
        &mut self,
        acl: &str,
        grantee: &Grantee,
        suites: &[String],
    ) -> Result<Vec<RevokeChange>, AclError> {
        let acl = self.acl_mut(acl)?;
        let mut changes = Vec::with_capacity(suites.len());
        for suite in suites {
            let before = acl.per_suite.len();
            acl.per_suite
                .retain(|grant| !(&grant.grantee == grantee && &grant.suite == suite));
            if acl.per_suite.len() < before {
                tracing::info!(acl = %acl.name, %grantee, %suite, "revoked suite");
                changes.push(RevokeChange::Removed(suite.clone()));
            } else {
                tracing::warn!(
                    acl = %acl.name,
                    %grantee,
                    %suite,
                    "tried to deny uploads for a suite that was not allowed before"
                );
                changes.push(RevokeChange::NotGranted(suite.clone()));
            }
        }
        Ok(changes)
    }

    /// Replace the explicit members of an ACL.
    ///
    /// Each entry is `fpr:<fingerprint>`, `uid:<uid>`, `name:<name>` or
    /// `keyring:<name>`. A uid or name entry adds every known key of the
    /// matching people; a keyring entry adds the current members of that
    /// active keyring. Blank lines and `#` comments are skipped, and entries
    /// naming no known key are reported rather than failing the update.
    pub fn set_fingerprints<'a>(
        &mut self,
        acl: &str,
        entries: impl IntoIterator<Item = &'a str>,
    ) -> Result<FingerprintUpdate, AclError> {
        // Fail on an unknown ACL before reading any entries.
        self.acl(acl)?;

        let mut update = FingerprintUpdate::default();
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let resolved = self.resolve_entry(entry);
            if resolved.is_empty() {
                tracing::warn!(%entry, "unknown key");
                update.unknown.push(entry.to_string());
            }
            update.fingerprints.extend(resolved);
        }

        let acl = self.acl_mut(acl)?;
        acl.fingerprints = update.fingerprints.clone();
        tracing::info!(acl = %acl.name, members = acl.fingerprints.len(), "set fingerprints");
        Ok(update)
    }

    fn resolve_entry(&self, entry: &str) -> Vec<Fingerprint> {
        let Some((field, value)) = entry.split_once(':') else {
            return Vec::new();
        };
        match field {
            "fpr" => value
                .parse::<Fingerprint>()
                .ok()
                .filter(|fingerprint| self.knows(fingerprint))
                .into_iter()
                .collect(),
            "uid" | "name" => self
                .uids
                .iter()
                .filter(|uid| match field {
                    "uid" => uid.uid == value,
                    _ => uid.name.as_deref() == Some(value),
                })
                .flat_map(|uid| uid.fingerprints.iter().copied())
                .filter(|fingerprint| self.knows(fingerprint))
                .collect(),
            "keyring" => self
                .keyring(value)
                .ok()
                .filter(|keyring| keyring.active)
                .map(|keyring| keyring.fingerprints().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Turn the per-source restriction of an ACL on or off.
    pub fn restrict_sources(&mut self, acl: &str, restricted: bool) -> Result<(), AclError> {
        let acl = self.acl_mut(acl)?;
        acl.allow_per_source = restricted;
        tracing::info!(acl = %acl.name, restricted, "per-source restriction");
        Ok(())
    }

    /// Turn the per-suite restriction of an ACL on or off.
    pub fn restrict_suites(&mut self, acl: &str, restricted: bool) -> Result<(), AclError> {
        let acl = self.acl_mut(acl)?;
        acl.allow_per_suite = restricted;
        tracing::info!(acl = %acl.name, restricted, "per-suite restriction");
        Ok(())
    }

    /// Per-source grants of an ACL, grouped by grantee, items sorted.
    pub fn export_per_source(&self, acl: &str) -> Result<Vec<ExportRecord>, AclError> {
        let acl = self.acl(acl)?;
        Ok(self.group(acl.per_source.iter().map(|grant| {
            (grant.grantee.clone(), grant.source.clone(), grant.created_by)
        })))
    }

    /// Per-suite grants of an ACL, grouped by grantee, items sorted.
    pub fn export_per_suite(&self, acl: &str) -> Result<Vec<ExportRecord>, AclError> {
        let acl = self.acl(acl)?;
        Ok(self.group(acl.per_suite.iter().map(|grant| {
            (grant.grantee.clone(), grant.suite.clone(), grant.created_by)
        })))
    }

    fn group(
        &self,
        grants: impl Iterator<Item = (Grantee, String, Option<Fingerprint>)>,
    ) -> Vec<ExportRecord> {
        let mut grouped: BTreeMap<Grantee, Vec<(String, Option<Fingerprint>)>> = BTreeMap::new();
        for (grantee, item, created_by) in grants {
            grouped.entry(grantee).or_default().push((item, created_by));
        }
        grouped
            .into_iter()
            .map(|(grantee, mut allow)| {
                allow.sort();
                let uid = match &grantee {
                    Grantee::Fingerprint(fingerprint) => {
                        self.uid_of(fingerprint).map(ToString::to_string)
                    }
                    Grantee::Keyring(_) => None,
                };
                ExportRecord {
                    grantee,
                    uid,
                    allow,
                }
            })
            .collect()
    }
}
