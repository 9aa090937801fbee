use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use warden_acl::Grantee;
use warden_credentials::Fingerprint;

#[derive(Debug, Parser)]
#[command(name = "warden")]
#[command(bin_name = "warden")]
#[command(about = "Signed-command moderation of policy queues", long_about = None)]
pub struct WardenCli {
    /// Configuration file. Relative paths inside it are resolved against
    /// its directory.
    #[arg(short, long, default_value = "warden.json")]
    pub config: PathBuf,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: WardenCommand,
}

#[derive(Debug, Subcommand)]
pub enum WardenCommand {
    /// Verify, authorize and apply every pending command file.
    ProcessCommands,

    /// Apply the decisions attached to entries of a policy queue.
    ProcessPolicy {
        /// The queue to scan.
        queue: String,
    },

    /// Inspect or feed policy queues.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// Administer access control lists.
    #[command(subcommand)]
    Acl(AclCommand),

    /// Manage signing keys.
    #[command(subcommand)]
    Key(KeyCommand),

    /// Clearsign a command document.
    Sign {
        /// File holding the base58 secret key.
        #[arg(short, long)]
        key: PathBuf,

        /// Where to write the signed document. Defaults to stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Payload to sign. Defaults to stdin.
        input: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// Print the entries of a queue as a table.
    List {
        /// The queue to list.
        queue: String,
    },

    /// Queue an upload.
    Add(QueueAddArgs),
}

#[derive(Debug, Args)]
pub struct QueueAddArgs {
    /// Policy queue to add to.
    #[arg(long)]
    pub queue: String,

    /// Source package name.
    #[arg(long)]
    pub source: String,

    /// Package version.
    #[arg(long)]
    pub version: String,

    /// Destination suite.
    #[arg(long)]
    pub suite: String,

    /// An artifact, as `architecture:component:filename`. Repeatable.
    #[arg(long = "artifact")]
    pub artifacts: Vec<String>,

    /// Fingerprint of an owner of the package. Repeatable.
    #[arg(long = "owner")]
    pub owners: Vec<Fingerprint>,

    /// First upload of this package.
    #[arg(long)]
    pub new: bool,
}

#[derive(Debug, Subcommand)]
pub enum AclCommand {
    /// Allow a grantee to act on sources under an ACL.
    Allow(GrantArgs),

    /// Revoke source grants.
    Deny(RevokeArgs),

    /// Allow a grantee to act on uploads to suites under an ACL.
    AllowSuite(GrantArgs),

    /// Revoke suite grants.
    DenySuite(RevokeArgs),

    /// Replace the explicit members of an ACL with `fpr:` and `keyring:`
    /// entries, one per line.
    SetFingerprints {
        /// The ACL.
        acl: String,

        /// File with the entries. Defaults to stdin.
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Turn per-source restriction of an ACL on, or off with `--lift`.
    RestrictSources {
        /// The ACL.
        acl: String,

        /// Remove the restriction instead.
        #[arg(long)]
        lift: bool,
    },

    /// Turn per-suite restriction of an ACL on, or off with `--lift`.
    RestrictSuites {
        /// The ACL.
        acl: String,

        /// Remove the restriction instead.
        #[arg(long)]
        lift: bool,
    },

    /// Print the per-source grants of an ACL.
    ExportPerSource {
        /// The ACL.
        acl: String,
    },

    /// Print the per-suite grants of an ACL.
    ExportPerSuite {
        /// The ACL.
        acl: String,
    },
}

#[derive(Debug, Args)]
pub struct GrantArgs {
    /// The ACL.
    pub acl: String,

    /// A fingerprint, or `keyring:<name>`.
    pub grantee: Grantee,

    /// Sources or suites to grant.
    #[arg(required = true)]
    pub items: Vec<String>,

    /// Why the grant is made.
    #[arg(long)]
    pub reason: Option<String>,

    /// Fingerprint of the person making the grant.
    #[arg(long)]
    pub by: Option<Fingerprint>,
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    /// The ACL.
    pub acl: String,

    /// A fingerprint, or `keyring:<name>`.
    pub grantee: Grantee,

    /// Sources or suites to revoke.
    #[arg(required = true)]
    pub items: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum KeyCommand {
    /// Generate a signing key.
    Generate(KeyGenerateArgs),
}

#[derive(Debug, Args)]
pub struct KeyGenerateArgs {
    /// Write the secret key here instead of printing it. Never overwrites an
    /// existing file.
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Add the public key to this keyring, creating it if needed.
    #[arg(long)]
    pub keyring: Option<String>,

    /// Record the key as held by this person.
    #[arg(long)]
    pub uid: Option<String>,

    /// Display name of the person given by `--uid`.
    #[arg(long, requires = "uid")]
    pub name: Option<String>,
}
