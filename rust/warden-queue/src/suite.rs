use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::QueueEntry;

/// A distribution channel artifacts are published into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suite {
    /// Suite name.
    pub name: String,
    /// Promotions into this suite land in the named suite instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_suite: Option<String>,
}

/// The known suites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuiteCatalog {
    suites: BTreeMap<String, Suite>,
}

impl SuiteCatalog {
    /// Build a catalog. Later duplicates replace earlier ones.
    pub fn new(suites: impl IntoIterator<Item = Suite>) -> Self {
        Self {
            suites: suites
                .into_iter()
                .map(|suite| (suite.name.clone(), suite))
                .collect(),
        }
    }

    /// Whether the suite is known.
    pub fn contains(&self, name: &str) -> bool {
        self.suites.contains_key(name)
    }

    /// Names of all known suites.
    pub fn names(&self) -> BTreeSet<String> {
        self.suites.keys().cloned().collect()
    }

    /// The redirect configured for the suite, if any.
    pub fn override_for(&self, name: &str) -> Option<&str> {
        self.suites
            .get(name)
            .and_then(|suite| suite.override_suite.as_deref())
    }

    /// Fill in the override redirect of an entry about to be queued. An
    /// explicit redirect already on the entry is kept.
    pub fn apply_override(&self, entry: &mut QueueEntry) {
        if entry.override_suite.is_none() {
            entry.override_suite = self.override_for(&entry.suite).map(str::to_string);
        }
    }
}
