use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, bail};
use tokio::io::AsyncReadExt;
use warden_acl::{
    AccessControlStore, AccessControlTable, GrantChange, GrantContext, RevokeChange,
    render_export,
};
use warden_command::{CommandProcessor, FileSystemLedger};
use warden_credentials::{ClearSigner, Ed25519Signer};
use warden_queue::{
    Applied, Artifact, FileSystemArchive, FileSystemPolicyQueue, PolicyQueueProcessor,
    PolicyQueueStore, QueueEntry, listing_rows, render_listing,
};

use crate::{
    AclCommand, GrantArgs, KeyCommand, KeyGenerateArgs, QueueAddArgs, QueueCommand, RevokeArgs,
    WardenCommand, WardenConfig,
};

/// How a command ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Everything went through.
    Clean,
    /// The command ran, but some of its inputs failed.
    WithFailures,
}

/// Runs CLI commands against a configuration.
#[derive(Debug, Clone)]
pub struct Warden {
    config: WardenConfig,
}

impl Warden {
    /// A runner for `config`.
    pub fn new(config: WardenConfig) -> Self {
        Self { config }
    }

    /// Run one command, writing its human-readable output to `out`.
    pub async fn run(
        &self,
        command: WardenCommand,
        out: &mut impl Write,
    ) -> anyhow::Result<Completion> {
        match command {
            WardenCommand::ProcessCommands => self.process_commands(out).await,
            WardenCommand::ProcessPolicy { queue } => self.process_policy(&queue, out).await,
            WardenCommand::Queue(QueueCommand::List { queue }) => {
                self.queue_list(&queue, out).await
            }
            WardenCommand::Queue(QueueCommand::Add(args)) => self.queue_add(args, out).await,
            WardenCommand::Acl(command) => self.acl(command, out).await,
            WardenCommand::Key(KeyCommand::Generate(args)) => self.key_generate(args, out).await,
            WardenCommand::Sign {
                key,
                out: path,
                input,
            } => self.sign(&key, path, input, out).await,
        }
    }

    async fn load_table(&self) -> anyhow::Result<AccessControlTable> {
        AccessControlTable::load(&self.config.access_control)
            .await
            .with_context(|| {
                format!(
                    "Cannot load access control table {}",
                    self.config.access_control.display()
                )
            })
    }

    async fn save_table(&self, table: &AccessControlTable) -> anyhow::Result<()> {
        table.validate()?;
        table
            .save(&self.config.access_control)
            .await
            .with_context(|| {
                format!(
                    "Cannot save access control table {}",
                    self.config.access_control.display()
                )
            })
    }

    async fn queue_store(&self) -> anyhow::Result<FileSystemPolicyQueue> {
        FileSystemPolicyQueue::new(&self.config.queue_root)
            .await
            .with_context(|| {
                format!(
                    "Cannot open queue store {}",
                    self.config.queue_root.display()
                )
            })
    }

    async fn process_commands(&self, out: &mut impl Write) -> anyhow::Result<Completion> {
        let acl = AccessControlStore::new(self.load_table().await?);
        let verifier = acl.verifier(self.config.freshness.into());
        let ledger = FileSystemLedger::new(&self.config.ledger)
            .await
            .with_context(|| format!("Cannot open ledger {}", self.config.ledger.display()))?;

        let processor = CommandProcessor::new(
            verifier,
            self.queue_store().await?,
            ledger,
            acl,
            self.config.command_processor(),
        );
        let report = processor.process_pending().await?;

        write!(out, "{report}")?;
        Ok(if report.has_failures() {
            Completion::WithFailures
        } else {
            Completion::Clean
        })
    }

    async fn process_policy(
        &self,
        queue: &str,
        out: &mut impl Write,
    ) -> anyhow::Result<Completion> {
        let processor = PolicyQueueProcessor::new(
            self.queue_store().await?,
            FileSystemArchive::new(&self.config.archive_root),
        )
        .with_artifact_timeout(Duration::from_millis(self.config.timeouts.artifact_ms));
        let report = processor.process(queue).await?;

        for (key, result) in &report.applied {
            match result {
                Ok(Applied::Promoted { suite }) => writeln!(out, "{key}: promoted to {suite}")?,
                Ok(Applied::Rejected) => writeln!(out, "{key}: rejected")?,
                Err(error) => writeln!(out, "{key}: {error} (will retry)")?,
            }
        }
        if !report.unresolved.is_empty() {
            writeln!(out, "{} entries still undecided", report.unresolved.len())?;
        }

        Ok(if report.has_failures() {
            Completion::WithFailures
        } else {
            Completion::Clean
        })
    }

    async fn queue_list(&self, queue: &str, out: &mut impl Write) -> anyhow::Result<Completion> {
        let entries = self.queue_store().await?.list(queue).await?;
        write!(out, "{}", render_listing(&listing_rows(&entries)))?;
        Ok(Completion::Clean)
    }

    async fn queue_add(
        &self,
        args: QueueAddArgs,
        out: &mut impl Write,
    ) -> anyhow::Result<Completion> {
        let catalog = self.config.catalog();
        if !catalog.contains(&args.suite) {
            bail!("Unknown suite '{}'", args.suite);
        }

        let mut entry = QueueEntry::new(&args.queue, &args.source, &args.version, &args.suite);
        entry.new = args.new;
        for artifact in &args.artifacts {
            let mut parts = artifact.splitn(3, ':');
            let (Some(architecture), Some(component), Some(filename)) =
                (parts.next(), parts.next(), parts.next())
            else {
                bail!("Artifact '{artifact}' is not architecture:component:filename");
            };
            entry = entry.with_artifact(Artifact::new(architecture, component, filename));
        }
        for owner in args.owners {
            entry = entry.with_owner(owner);
        }
        catalog.apply_override(&mut entry);

        let key = entry.key();
        let destination = entry.effective_suite().to_string();
        self.queue_store().await?.insert(entry).await?;
        writeln!(out, "{key}: queued for {destination}")?;
        Ok(Completion::Clean)
    }

    async fn acl(&self, command: AclCommand, out: &mut impl Write) -> anyhow::Result<Completion> {
        let mut table = self.load_table().await?;

        match command {
            AclCommand::Allow(args) => {
                let context = grant_context(&args);
                let changes = table.allow(&args.acl, &args.grantee, &args.items, &context)?;
                report_grants(&changes, out)?;
            }
            AclCommand::Deny(RevokeArgs {
                acl,
                grantee,
                items,
            }) => {
                let changes = table.deny(&acl, &grantee, &items)?;
                report_revocations(&changes, out)?;
            }
            AclCommand::AllowSuite(args) => {
                let context = grant_context(&args);
                let changes = table.allow_suite(
                    &args.acl,
                    &args.grantee,
                    &args.items,
                    &self.config.catalog().names(),
                    &context,
                )?;
                report_grants(&changes, out)?;
            }
            AclCommand::DenySuite(RevokeArgs {
                acl,
                grantee,
                items,
            }) => {
                let changes = table.deny_suite(&acl, &grantee, &items)?;
                report_revocations(&changes, out)?;
            }
            AclCommand::SetFingerprints { acl, from } => {
                let text = read_input(from.as_deref()).await?;
                let update = table.set_fingerprints(&acl, text.lines())?;
                for unknown in &update.unknown {
                    writeln!(out, "Unknown key: {unknown}")?;
                }
                writeln!(out, "{acl}: {} members", update.fingerprints.len())?;
            }
            AclCommand::RestrictSources { acl, lift } => {
                table.restrict_sources(&acl, !lift)?;
            }
            AclCommand::RestrictSuites { acl, lift } => {
                table.restrict_suites(&acl, !lift)?;
            }
            AclCommand::ExportPerSource { acl } => {
                write!(out, "{}", render_export(&table.export_per_source(&acl)?))?;
                return Ok(Completion::Clean);
            }
            AclCommand::ExportPerSuite { acl } => {
                write!(out, "{}", render_export(&table.export_per_suite(&acl)?))?;
                return Ok(Completion::Clean);
            }
        }

        self.save_table(&table).await?;
        Ok(Completion::Clean)
    }

    async fn key_generate(
        &self,
        args: KeyGenerateArgs,
        out: &mut impl Write,
    ) -> anyhow::Result<Completion> {
        let key = Ed25519Signer::generate()?;

        match args.out {
            Some(path) => {
                let mut file = std::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .with_context(|| format!("Cannot create {}", path.display()))?;
                writeln!(file, "{}", key.export())?;
            }
            None => writeln!(out, "Secret: {}", key.export())?,
        }
        writeln!(out, "Fingerprint: {}", key.fingerprint())?;
        writeln!(out, "Public key: {}", key.public_key())?;

        if args.keyring.is_none() && args.uid.is_none() {
            return Ok(Completion::Clean);
        }

        let mut table = self.load_table().await?;
        if let Some(name) = &args.keyring {
            let keyring = table.keyring_or_insert(name);
            if !keyring.contains(&key.fingerprint()) {
                keyring.keys.push(key.public_key());
            }
            writeln!(out, "Added to keyring {name}")?;
        }
        if let Some(uid) = &args.uid {
            let person = table.uid_or_insert(uid);
            person.fingerprints.insert(key.fingerprint());
            if let Some(name) = args.name {
                person.name = Some(name);
            }
            writeln!(out, "Held by {person}")?;
        }
        self.save_table(&table).await?;
        Ok(Completion::Clean)
    }

    async fn sign(
        &self,
        key: &Path,
        path: Option<PathBuf>,
        input: Option<PathBuf>,
        out: &mut impl Write,
    ) -> anyhow::Result<Completion> {
        let secret = tokio::fs::read_to_string(key)
            .await
            .with_context(|| format!("Cannot read key {}", key.display()))?;
        let signer = ClearSigner::new(Ed25519Signer::from_base58(&secret)?);
        let document = signer.sign(&read_input(input.as_deref()).await?);

        match path {
            Some(path) => tokio::fs::write(&path, document)
                .await
                .with_context(|| format!("Cannot write {}", path.display()))?,
            None => write!(out, "{document}")?,
        }
        Ok(Completion::Clean)
    }
}

fn grant_context(args: &GrantArgs) -> GrantContext {
    let reason = args
        .reason
        .clone()
        .unwrap_or_else(|| default_reason(std::env::var("USER").ok().as_deref()));
    let mut context = GrantContext::now(Some(reason));
    context.created_by = args.by;
    context
}

/// The reason recorded for a grant made without `--reason`.
fn default_reason(user: Option<&str>) -> String {
    format!("set by {} via CLI", user.unwrap_or("(unknown)"))
}

fn report_grants(changes: &[GrantChange], out: &mut impl Write) -> anyhow::Result<()> {
    for change in changes {
        match change {
            GrantChange::Added(item) => writeln!(out, "Allowed {item}")?,
            GrantChange::AlreadyGranted(item) => writeln!(out, "Already allowed {item}")?,
        }
    }
    Ok(())
}

fn report_revocations(changes: &[RevokeChange], out: &mut impl Write) -> anyhow::Result<()> {
    for change in changes {
        match change {
            RevokeChange::Removed(item) => writeln!(out, "Denied {item}")?,
            RevokeChange::NotGranted(item) => {
                writeln!(out, "Warning: {item} was not allowed before")?
            }
        }
    }
    Ok(())
}

/// The contents of `path`, or of stdin.
async fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("Cannot read stdin")?;
            Ok(text)
        }
    }
}
