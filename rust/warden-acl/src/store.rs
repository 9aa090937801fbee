use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use warden_credentials::{Fingerprint, Freshness, KeyringVerifier};

use crate::{AccessControlTable, Acl, AuthorizationTarget, Denial, Permit, decide};

/// A read-only snapshot of the access control table with the lookups
/// command processing needs.
///
/// The snapshot is cheap to clone and is shared by every file processed in
/// a run, so a run sees one consistent view of keyrings and ACLs.
#[derive(Debug, Clone)]
pub struct AccessControlStore {
    table: Arc<AccessControlTable>,
    holders: Arc<HashMap<Fingerprint, Vec<usize>>>,
    memberships: Arc<HashMap<Fingerprint, BTreeSet<String>>>,
}

impl AccessControlStore {
    /// Index a table. Inactive keyrings contribute neither memberships nor
    /// ACL holders.
    pub fn new(table: AccessControlTable) -> Self {
        let mut memberships: HashMap<Fingerprint, BTreeSet<String>> = HashMap::new();
        for keyring in table.keyrings.iter().filter(|keyring| keyring.active) {
            for fingerprint in keyring.fingerprints() {
                memberships
                    .entry(fingerprint)
                    .or_default()
                    .insert(keyring.name.clone());
            }
        }

        let mut holders: HashMap<Fingerprint, Vec<usize>> = HashMap::new();
        for (index, acl) in table.acls.iter().enumerate() {
            let mut members: BTreeSet<Fingerprint> = acl.fingerprints.clone();
            if let Some(name) = &acl.match_keyring {
                members.extend(
                    memberships
                        .iter()
                        .filter(|(_, keyrings)| keyrings.contains(name))
                        .map(|(fingerprint, _)| *fingerprint),
                );
            }
            for fingerprint in members {
                holders.entry(fingerprint).or_default().push(index);
            }
        }

        Self {
            table: Arc::new(table),
            holders: Arc::new(holders),
            memberships: Arc::new(memberships),
        }
    }

    /// The underlying table.
    pub fn table(&self) -> &AccessControlTable {
        &self.table
    }

    /// Names of the active keyrings containing this key.
    pub fn keyrings_of(&self, fingerprint: &Fingerprint) -> BTreeSet<String> {
        self.memberships
            .get(fingerprint)
            .cloned()
            .unwrap_or_default()
    }

    /// Every ACL held by this key. An empty result is not an error; it
    /// means the signer may not decide anything.
    pub fn resolve(&self, fingerprint: &Fingerprint) -> Entitlements<'_> {
        let acls = self
            .holders
            .get(fingerprint)
            .map(|indices| indices.iter().map(|index| &self.table.acls[*index]).collect())
            .unwrap_or_default();
        Entitlements {
            fingerprint: *fingerprint,
            keyrings: self.keyrings_of(fingerprint),
            acls,
        }
    }

    /// A verifier trusting every key in the active keyrings of this snapshot.
    pub fn verifier(&self, freshness: Freshness) -> KeyringVerifier {
        KeyringVerifier::new(&self.table.keyrings).with_freshness(freshness)
    }
}

/// The ACLs a signer holds, together with what grants are matched against.
#[derive(Debug, Clone)]
pub struct Entitlements<'a> {
    /// The signer.
    pub fingerprint: Fingerprint,
    /// Active keyrings the signer belongs to.
    pub keyrings: BTreeSet<String>,
    /// ACLs held by the signer.
    pub acls: Vec<&'a Acl>,
}

impl Entitlements<'_> {
    /// Names of the held ACLs.
    pub fn acl_names(&self) -> impl Iterator<Item = &str> {
        self.acls.iter().map(|acl| acl.name.as_str())
    }

    /// Decide whether the signer may act on `target`.
    pub fn authorize(&self, target: &AuthorizationTarget) -> Result<Permit, Denial> {
        decide(&self.fingerprint, &self.keyrings, &self.acls, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Capability;
    use pretty_assertions::assert_eq;
    use warden_credentials::{Ed25519Signer, Keyring};

    #[test]
    fn it_resolves_acls_through_keyrings_and_explicit_members() {
        let alice = Ed25519Signer::import(&[1u8; 32]);
        let bob = Ed25519Signer::import(&[2u8; 32]);
        let carol = Ed25519Signer::import(&[3u8; 32]);

        let table = AccessControlTable::default()
            .with_keyring(
                Keyring::new("dd")
                    .with_key(alice.public_key())
                    .with_key(bob.public_key()),
            )
            .with_keyring(Keyring::new("dm").with_key(bob.public_key()))
            .with_acl(
                Acl::new("full")
                    .with_all_capabilities()
                    .matching_keyring("dd"),
            )
            .with_acl(
                Acl::new("dm")
                    .with_capability(Capability::Source)
                    .matching_keyring("dm"),
            )
            .with_acl(
                Acl::new("explicit")
                    .with_capability(Capability::Source)
                    .with_fingerprint(carol.fingerprint()),
            );
        let store = AccessControlStore::new(table);

        let alice_acls: Vec<_> = store
            .resolve(&alice.fingerprint())
            .acl_names()
            .map(String::from)
            .collect();
        assert_eq!(alice_acls, vec!["full".to_string()]);

        let bob_acls: BTreeSet<_> = store
            .resolve(&bob.fingerprint())
            .acl_names()
            .map(String::from)
            .collect();
        assert_eq!(bob_acls, BTreeSet::from(["full".to_string(), "dm".to_string()]));

        let carol = store.resolve(&carol.fingerprint());
        assert_eq!(carol.acl_names().collect::<Vec<_>>(), vec!["explicit"]);
        assert!(carol.keyrings.is_empty());
    }

    #[test]
    fn it_resolves_nothing_for_strangers() {
        let store = AccessControlStore::new(AccessControlTable::default());
        let stranger = Ed25519Signer::import(&[9u8; 32]);
        assert!(store.resolve(&stranger.fingerprint()).acls.is_empty());
    }

    #[test]
    fn it_ignores_members_of_inactive_keyrings() {
        let alice = Ed25519Signer::import(&[1u8; 32]);
        let table = AccessControlTable::default()
            .with_keyring(
                Keyring::new("emeritus")
                    .with_key(alice.public_key())
                    .deactivated(),
            )
            .with_acl(
                Acl::new("full")
                    .with_all_capabilities()
                    .matching_keyring("emeritus"),
            );
        let store = AccessControlStore::new(table);
        assert!(store.resolve(&alice.fingerprint()).acls.is_empty());
        assert!(!store.verifier(Freshness::default()).knows(&alice.fingerprint()));
    }
}
