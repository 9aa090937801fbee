use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use base58::ToBase58;
use serde::{Deserialize, Serialize};
use warden_credentials::{Fingerprint, Keyring};

use crate::{Acl, AclError, Uid};

/// The persistent form of all keyrings and ACLs, as stored in `acl.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControlTable {
    /// Known keyrings.
    #[serde(default)]
    pub keyrings: Vec<Keyring>,
    /// Known ACLs.
    #[serde(default)]
    pub acls: Vec<Acl>,
    /// People and the keys they sign with.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uids: Vec<Uid>,
}

impl AccessControlTable {
    /// Add a keyring.
    pub fn with_keyring(mut self, keyring: Keyring) -> Self {
        self.keyrings.push(keyring);
        self
    }

    /// Add an ACL.
    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acls.push(acl);
        self
    }

    /// Add a person.
    pub fn with_uid(mut self, uid: Uid) -> Self {
        self.uids.push(uid);
        self
    }

    /// The person holding the key, if one is recorded.
    pub fn uid_of(&self, fingerprint: &Fingerprint) -> Option<&Uid> {
        self.uids.iter().find(|uid| uid.fingerprints.contains(fingerprint))
    }

    /// Look up a person for modification, creating them if needed.
    pub fn uid_or_insert(&mut self, uid: &str) -> &mut Uid {
        let index = match self.uids.iter().position(|known| known.uid == uid) {
            Some(index) => index,
            None => {
                self.uids.push(Uid::new(uid));
                self.uids.len() - 1
            }
        };
        &mut self.uids[index]
    }

    /// Look up a keyring by name.
    pub fn keyring(&self, name: &str) -> Result<&Keyring, AclError> {
        self.keyrings
            .iter()
            .find(|keyring| keyring.name == name)
            .ok_or_else(|| AclError::UnknownKeyring(name.to_string()))
    }

    /// Look up a keyring by name for modification, creating an empty one if
    /// it does not exist yet.
    pub fn keyring_or_insert(&mut self, name: &str) -> &mut Keyring {
        let index = match self.keyrings.iter().position(|keyring| keyring.name == name) {
            Some(index) => index,
            None => {
                self.keyrings.push(Keyring::new(name));
                self.keyrings.len() - 1
            }
        };
        &mut self.keyrings[index]
    }

    /// Look up an ACL by name.
    pub fn acl(&self, name: &str) -> Result<&Acl, AclError> {
        self.acls
            .iter()
            .find(|acl| acl.name == name)
            .ok_or_else(|| AclError::UnknownAcl(name.to_string()))
    }

    /// Look up an ACL by name for modification.
    pub fn acl_mut(&mut self, name: &str) -> Result<&mut Acl, AclError> {
        self.acls
            .iter_mut()
            .find(|acl| acl.name == name)
            .ok_or_else(|| AclError::UnknownAcl(name.to_string()))
    }

    /// Whether the key is a member of at least one active keyring.
    pub fn knows(&self, fingerprint: &Fingerprint) -> bool {
        self.keyrings
            .iter()
            .filter(|keyring| keyring.active)
            .any(|keyring| keyring.contains(fingerprint))
    }

    /// Check that keyring, ACL and uid names are unique and that no key
    /// belongs to two people.
    pub fn validate(&self) -> Result<(), AclError> {
        let mut seen = BTreeSet::new();
        for name in self.keyrings.iter().map(|keyring| &keyring.name) {
            if !seen.insert(name) {
                return Err(AclError::DuplicateName(name.clone()));
            }
        }
        let mut seen = BTreeSet::new();
        for name in self.acls.iter().map(|acl| &acl.name) {
            if !seen.insert(name) {
                return Err(AclError::DuplicateName(name.clone()));
            }
        }
        let mut seen = BTreeSet::new();
        let mut held = BTreeSet::new();
        for uid in &self.uids {
            if !seen.insert(&uid.uid) {
                return Err(AclError::DuplicateName(uid.uid.clone()));
            }
            if let Some(shared) = uid.fingerprints.iter().find(|key| !held.insert(*key)) {
                return Err(AclError::DuplicateName(shared.to_string()));
            }
        }
        Ok(())
    }

    /// Read a table from a JSON file. A missing file reads as an empty
    /// table.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AclError> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no access control table, starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(AclError::Storage(e.to_string())),
        };
        let table: Self =
            serde_json::from_slice(&bytes).map_err(|e| AclError::Encoding(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Write the table to a JSON file, replacing it atomically.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), AclError> {
        let path = path.as_ref();
        self.validate()?;
        let content =
            serde_json::to_vec_pretty(self).map_err(|e| AclError::Encoding(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AclError::Storage(e.to_string()))?;
        }

        let hash: [u8; 32] = blake3::hash(&content).into();
        let mut tmp_path = PathBuf::from(path);
        tmp_path.set_extension(format!("{}.tmp", hash.to_base58()));

        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| AclError::Storage(e.to_string()))?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| AclError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Capability;
    use pretty_assertions::assert_eq;
    use warden_credentials::Ed25519Signer;

    #[tokio::test]
    async fn it_reads_a_missing_table_as_empty() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let table = AccessControlTable::load(tempdir.path().join("acl.json")).await?;
        assert_eq!(table, AccessControlTable::default());
        Ok(())
    }

    #[tokio::test]
    async fn it_saves_and_loads_a_table() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("nested").join("acl.json");
        let key = Ed25519Signer::import(&[1u8; 32]).public_key();
        let table = AccessControlTable::default()
            .with_keyring(Keyring::new("dm").with_key(key))
            .with_acl(
                Acl::new("process-upload")
                    .with_capability(Capability::Source)
                    .matching_keyring("dm"),
            );

        table.save(&path).await?;
        let loaded = AccessControlTable::load(&path).await?;
        assert_eq!(loaded, table);

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn it_rejects_duplicate_acl_names() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let path = tempdir.path().join("acl.json");
        std::fs::write(
            &path,
            r#"{"acls":[{"name":"process-upload"},{"name":"process-upload"}]}"#,
        )?;
        assert_eq!(
            AccessControlTable::load(&path).await,
            Err(AclError::DuplicateName("process-upload".into()))
        );
        Ok(())
    }

    #[test]
    fn it_only_knows_keys_in_active_keyrings() {
        let alice = Ed25519Signer::import(&[1u8; 32]);
        let bob = Ed25519Signer::import(&[2u8; 32]);
        let table = AccessControlTable::default()
            .with_keyring(Keyring::new("dm").with_key(alice.public_key()))
            .with_keyring(
                Keyring::new("emeritus")
                    .with_key(bob.public_key())
                    .deactivated(),
            );
        assert!(table.knows(&alice.fingerprint()));
        assert!(!table.knows(&bob.fingerprint()));
    }
}
