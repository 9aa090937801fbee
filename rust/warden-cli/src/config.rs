use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use warden_command::{CommandDirectories, CommandProcessorConfig};
use warden_credentials::Freshness;
use warden_queue::{Suite, SuiteCatalog};

/// Locations of command files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPaths {
    /// Files waiting to be processed.
    pub pending: PathBuf,
    /// Processed files.
    pub done: PathBuf,
    /// Files that failed verification.
    pub rejected: PathBuf,
}

impl Default for CommandPaths {
    fn default() -> Self {
        Self {
            pending: "commands".into(),
            done: "commands/done".into(),
            rejected: "commands/rejected".into(),
        }
    }
}

/// Signature age limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Oldest acceptable signature, in seconds. `null` disables the check.
    pub max_age_secs: Option<u64>,
    /// Tolerated clock difference for signatures from the future.
    pub clock_skew_secs: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_secs: Some(7 * 24 * 60 * 60),
            clock_skew_secs: 300,
        }
    }
}

impl From<FreshnessConfig> for Freshness {
    fn from(config: FreshnessConfig) -> Self {
        Freshness {
            max_age: config.max_age_secs.map(Duration::from_secs),
            clock_skew: Duration::from_secs(config.clock_skew_secs),
        }
    }
}

/// Operation time bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Reading one command file.
    pub read_ms: u64,
    /// Verifying one command file.
    pub verify_ms: u64,
    /// Moving the artifacts of one queue entry.
    pub artifact_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            read_ms: 10_000,
            verify_ms: 10_000,
            artifact_ms: 60_000,
        }
    }
}

/// The contents of `warden.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// The keyring and ACL table.
    pub access_control: PathBuf,
    /// Root of the policy queue store.
    pub queue_root: PathBuf,
    /// Root of the artifact archive.
    pub archive_root: PathBuf,
    /// Directory of the consumed-document ledger.
    pub ledger: PathBuf,
    /// Command file locations.
    pub commands: CommandPaths,
    /// Queue addressed by directives that do not name one.
    pub default_queue: String,
    /// Known suites and their override redirects.
    pub suites: Vec<Suite>,
    /// Signature age limits.
    pub freshness: FreshnessConfig,
    /// Operation time bounds.
    pub timeouts: TimeoutConfig,
    /// Command files handled at once.
    pub concurrency: usize,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            access_control: "acl.json".into(),
            queue_root: "queue-db".into(),
            archive_root: "archive".into(),
            ledger: "ledger".into(),
            commands: CommandPaths::default(),
            default_queue: "unchecked".into(),
            suites: vec![
                Suite {
                    name: "unstable".into(),
                    override_suite: None,
                },
                Suite {
                    name: "stable".into(),
                    override_suite: None,
                },
                Suite {
                    name: "stable-proposed".into(),
                    override_suite: Some("stable".into()),
                },
            ],
            freshness: FreshnessConfig::default(),
            timeouts: TimeoutConfig::default(),
            concurrency: 4,
        }
    }
}

impl WardenConfig {
    /// Read the configuration at `path`, falling back to the defaults when
    /// the file does not exist. Relative paths are resolved against the
    /// directory holding `path`.
    pub async fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid configuration in {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read {}", path.display()));
            }
        };

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolved_against(base))
    }

    /// Make every relative path relative to `base` instead.
    pub fn resolved_against(mut self, base: &Path) -> Self {
        for path in [
            &mut self.access_control,
            &mut self.queue_root,
            &mut self.archive_root,
            &mut self.ledger,
            &mut self.commands.pending,
            &mut self.commands.done,
            &mut self.commands.rejected,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        self
    }

    /// The suite catalog.
    pub fn catalog(&self) -> SuiteCatalog {
        SuiteCatalog::new(self.suites.iter().cloned())
    }

    /// Settings for the command processor.
    pub fn command_processor(&self) -> CommandProcessorConfig {
        CommandProcessorConfig {
            directories: CommandDirectories {
                pending: self.commands.pending.clone(),
                done: self.commands.done.clone(),
                rejected: self.commands.rejected.clone(),
            },
            default_queue: self.default_queue.clone(),
            concurrency: self.concurrency,
            read_timeout: Duration::from_millis(self.timeouts.read_ms),
            verify_timeout: Duration::from_millis(self.timeouts.verify_ms),
        }
    }
}
