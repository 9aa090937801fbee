use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use warden_acl::AuthorizationTarget;
use warden_credentials::Fingerprint;

/// Architecture name used for source artifacts.
pub const SOURCE_ARCHITECTURE: &str = "source";

/// Architecture name used for architecture-independent binaries.
pub const ARCH_INDEPENDENT: &str = "all";

/// Identifies a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    /// Policy queue name.
    pub queue: String,
    /// Source package name.
    pub source: String,
    /// Package version.
    pub version: String,
}

impl EntryKey {
    /// Create a key.
    pub fn new(
        queue: impl Into<String>,
        source: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            source: source.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}_{}", self.queue, self.source, self.version)
    }
}

/// One file belonging to a queue entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    /// `source`, `all`, or a concrete architecture.
    pub architecture: String,
    /// Archive component, such as `main`.
    pub component: String,
    /// File name inside the queue directory.
    pub filename: String,
}

impl Artifact {
    /// Create an artifact.
    pub fn new(
        architecture: impl Into<String>,
        component: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            architecture: architecture.into(),
            component: component.into(),
            filename: filename.into(),
        }
    }

    /// Whether this is part of the source package.
    pub fn is_source(&self) -> bool {
        self.architecture == SOURCE_ARCHITECTURE
    }
}

/// The decision state of an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Decision {
    /// Nobody has decided yet.
    #[default]
    Unresolved,
    /// The entry is to be promoted.
    Accepted {
        /// The signer who accepted.
        by: Fingerprint,
        /// When the decision was attached.
        at: DateTime<Utc>,
        /// Optional free-form reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// The entry is to be discarded.
    Rejected {
        /// The signer who rejected.
        by: Fingerprint,
        /// When the decision was attached.
        at: DateTime<Utc>,
        /// Optional free-form reason.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl Decision {
    /// Whether a decision has been made.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Decision::Unresolved)
    }

    /// The signer who made the decision.
    pub fn decided_by(&self) -> Option<&Fingerprint> {
        match self {
            Decision::Unresolved => None,
            Decision::Accepted { by, .. } | Decision::Rejected { by, .. } => Some(by),
        }
    }

    /// Short label for listings and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Unresolved => "unresolved",
            Decision::Accepted { .. } => "accepted",
            Decision::Rejected { .. } => "rejected",
        }
    }
}

/// An upload waiting in a policy queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Policy queue name.
    pub queue: String,
    /// Source package name.
    pub source: String,
    /// Package version.
    pub version: String,
    /// Files in the upload.
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// The suite the upload targets.
    pub suite: String,
    /// Where the suite redirects promotions to, if anywhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_suite: Option<String>,
    /// Uploader and maintainers of record.
    #[serde(default)]
    pub owners: BTreeSet<Fingerprint>,
    /// Whether this is the first upload of the package.
    #[serde(default)]
    pub new: bool,
    /// When the entry was queued.
    pub created: DateTime<Utc>,
    /// The decision attached so far.
    #[serde(default)]
    pub decision: Decision,
}

impl QueueEntry {
    /// A new, undecided entry with no artifacts.
    pub fn new(
        queue: impl Into<String>,
        source: impl Into<String>,
        version: impl Into<String>,
        suite: impl Into<String>,
    ) -> Self {
        Self {
            queue: queue.into(),
            source: source.into(),
            version: version.into(),
            artifacts: Vec::new(),
            suite: suite.into(),
            override_suite: None,
            owners: BTreeSet::new(),
            new: false,
            created: Utc::now(),
            decision: Decision::Unresolved,
        }
    }

    /// Add an artifact.
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// Add an owner.
    pub fn with_owner(mut self, owner: Fingerprint) -> Self {
        self.owners.insert(owner);
        self
    }

    /// The key of this entry.
    pub fn key(&self) -> EntryKey {
        EntryKey::new(&self.queue, &self.source, &self.version)
    }

    /// Where an accepted entry is promoted to.
    pub fn effective_suite(&self) -> &str {
        self.override_suite.as_deref().unwrap_or(&self.suite)
    }

    /// What the authorization decider needs to know about this entry.
    pub fn authorization_target(&self) -> AuthorizationTarget {
        AuthorizationTarget {
            source: self.source.clone(),
            suite: self.effective_suite().to_string(),
            new: self.new,
            has_source: self.artifacts.iter().any(Artifact::is_source),
            has_binaries: self.artifacts.iter().any(|artifact| !artifact.is_source()),
            has_arch_all: self
                .artifacts
                .iter()
                .any(|artifact| artifact.architecture == ARCH_INDEPENDENT),
            owners: self.owners.clone(),
        }
    }
}
