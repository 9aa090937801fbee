use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Utc;
use futures_util::{StreamExt, stream};
use parking_lot::Mutex;
use tracing::Instrument;
use warden_acl::AccessControlStore;
use warden_credentials::{DocumentDigest, DocumentVerifier, Fingerprint, VerifiedDocument};
use warden_queue::{Decision, PolicyQueueStore};

use crate::{
    AppliedDirective, Command, Directive, DirectiveError, DirectiveReport, FileError,
    FileReport, FileStatus, Ledger, LedgerRecord, RunReport, parse_directives,
};

/// Where command files are picked up and where they go afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDirectories {
    /// Files waiting to be processed.
    pub pending: PathBuf,
    /// Files that were verified, whatever their directives led to.
    pub done: PathBuf,
    /// Files that failed verification.
    pub rejected: PathBuf,
}

impl CommandDirectories {
    /// `done/` and `rejected/` inside the pending directory.
    pub fn under(pending: impl Into<PathBuf>) -> Self {
        let pending = pending.into();
        Self {
            done: pending.join("done"),
            rejected: pending.join("rejected"),
            pending,
        }
    }
}

/// Tunables of a [`CommandProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProcessorConfig {
    /// Command file locations.
    pub directories: CommandDirectories,
    /// Queue used by directives that do not name one.
    pub default_queue: String,
    /// How many files are handled at once.
    pub concurrency: usize,
    /// Bound on reading one file.
    pub read_timeout: Duration,
    /// Bound on verifying one file.
    pub verify_timeout: Duration,
}

impl CommandProcessorConfig {
    /// Defaults for the given directories.
    pub fn new(directories: CommandDirectories) -> Self {
        Self {
            directories,
            default_queue: "unchecked".to_string(),
            concurrency: 4,
            read_timeout: Duration::from_secs(10),
            verify_timeout: Duration::from_secs(10),
        }
    }
}

/// Turns pending command files into decisions on policy queue entries.
///
/// For every file: skip it if its digest is in the ledger, verify it, parse
/// its directives, and for each directive find the entry, authorize the
/// signer against it and attach the decision. The file is then recorded in
/// the ledger and moved out of the pending directory.
///
/// Files are handled concurrently. Two directives racing for the same entry
/// are arbitrated by the queue store, so only one of them is attached.
pub struct CommandProcessor<V, Q, L>
where
    V: DocumentVerifier,
    Q: PolicyQueueStore,
    L: Ledger,
{
    verifier: V,
    store: Q,
    ledger: L,
    acl: AccessControlStore,
    config: CommandProcessorConfig,
}

impl<V, Q, L> CommandProcessor<V, Q, L>
where
    V: DocumentVerifier,
    Q: PolicyQueueStore,
    L: Ledger,
{
    /// A processor over the given collaborators.
    pub fn new(
        verifier: V,
        store: Q,
        ledger: L,
        acl: AccessControlStore,
        config: CommandProcessorConfig,
    ) -> Self {
        Self {
            verifier,
            store,
            ledger,
            acl,
            config,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &CommandProcessorConfig {
        &self.config
    }

    /// Handle every file currently in the pending directory.
    ///
    /// Only a failure to list the directory fails the run; everything else
    /// is reported per file.
    pub async fn process_pending(&self) -> Result<RunReport, FileError> {
        let files = self.pending_files().await?;
        tracing::info!(count = files.len(), "processing command files");

        // Copies of one document in the same run are consumed once
        let claimed = Mutex::new(HashSet::new());

        let mut files: Vec<FileReport> = stream::iter(files)
            .map(|path| self.process_file(path, &claimed))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        files.sort_by(|a, b| a.file.cmp(&b.file));

        Ok(RunReport { files })
    }

    async fn pending_files(&self) -> Result<Vec<PathBuf>, FileError> {
        let pending = &self.config.directories.pending;
        let read_error = |e: std::io::Error| FileError::Read(format!("{}: {e}", pending.display()));

        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(pending).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(read_error(e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            let file_type = entry.file_type().await.map_err(read_error)?;
            if file_type.is_file() && !hidden {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    async fn process_file(
        &self,
        file: PathBuf,
        claimed: &Mutex<HashSet<DocumentDigest>>,
    ) -> FileReport {
        let span = tracing::info_span!(
            "command_file",
            file = %file.display(),
            fingerprint = tracing::field::Empty,
        );
        async {
            let mut report = FileReport {
                file: file.clone(),
                digest: None,
                status: FileStatus::AlreadyConsumed,
            };

            let read = tokio::time::timeout(self.config.read_timeout, tokio::fs::read(&file));
            let bytes = match read.await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(e)) => return report.failed(FileError::Read(e.to_string())),
                Err(_) => return report.failed(FileError::ReadTimeout(self.config.read_timeout)),
            };
            let raw = DocumentDigest::hash(&bytes);
            report.digest = Some(raw);

            match self.claim(&raw, claimed).await {
                Ok(true) => {}
                Ok(false) => return self.skip_consumed(report).await,
                Err(e) => return report.failed(e),
            }

            let verified = match tokio::time::timeout(
                self.config.verify_timeout,
                self.verifier.verify(&bytes),
            )
            .await
            {
                Ok(verified) => verified,
                Err(_) => {
                    claimed.lock().remove(&raw);
                    return report.failed(FileError::VerifyTimeout(self.config.verify_timeout));
                }
            };

            let document = match verified {
                Ok(document) => document,
                Err(error) => {
                    tracing::warn!(%error, "command file failed verification");
                    let rejected = &self.config.directories.rejected;
                    if let Err(e) = self.consume(&file, &[raw], None, rejected).await {
                        tracing::error!(error = %e, "could not mark command file as consumed");
                        return report.failed(e);
                    }
                    report.status = FileStatus::Unverified(error);
                    return report;
                }
            };

            tracing::Span::current()
                .record("fingerprint", tracing::field::display(&document.fingerprint));

            // The same signed statement may arrive in a different envelope
            if document.digest != raw {
                report.digest = Some(document.digest);
                match self.claim(&document.digest, claimed).await {
                    Ok(true) => {}
                    Ok(false) => return self.skip_consumed(report).await,
                    Err(e) => {
                        claimed.lock().remove(&raw);
                        return report.failed(e);
                    }
                }
            }

            let directives = self.apply_document(&document).await;
            let done = &self.config.directories.done;
            let digests = [document.digest, raw];
            let digests = if document.digest == raw {
                &digests[..1]
            } else {
                &digests[..]
            };
            if let Err(e) = self
                .consume(&file, digests, Some(document.fingerprint), done)
                .await
            {
                tracing::error!(error = %e, "could not mark command file as consumed");
                return report.failed(e);
            }
            report.status = FileStatus::Processed {
                fingerprint: document.fingerprint,
                directives,
            };
            report
        }
        .instrument(span)
        .await
    }

    /// Claim `digest` for this run. `false` means the document was consumed
    /// before, or another copy of it is already being handled.
    ///
    /// Nothing is claimed when the ledger cannot be consulted, so a copy
    /// that fails here does not shadow its siblings.
    async fn claim(
        &self,
        digest: &DocumentDigest,
        claimed: &Mutex<HashSet<DocumentDigest>>,
    ) -> Result<bool, FileError> {
        if self.ledger.contains(digest).await? {
            return Ok(false);
        }
        Ok(claimed.lock().insert(*digest))
    }

    async fn skip_consumed(&self, mut report: FileReport) -> FileReport {
        tracing::info!(digest = ?report.digest, "already consumed");
        if let Err(e) = move_into(&report.file, &self.config.directories.done).await {
            return report.failed(e);
        }
        report.status = FileStatus::AlreadyConsumed;
        report
    }

    async fn consume(
        &self,
        file: &Path,
        digests: &[DocumentDigest],
        fingerprint: Option<Fingerprint>,
        destination: &Path,
    ) -> Result<(), FileError> {
        let record = LedgerRecord {
            file: file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            fingerprint,
            consumed: Utc::now(),
        };
        for digest in digests {
            self.ledger.record(digest, record.clone()).await?;
        }
        move_into(file, destination).await
    }

    async fn apply_document(&self, document: &VerifiedDocument) -> Vec<DirectiveReport> {
        let mut reports = Vec::new();
        for (block, parsed) in parse_directives(&document.payload).into_iter().enumerate() {
            let result = match parsed {
                Ok(directive) => self.apply(&document.fingerprint, &directive).await,
                Err(malformed) => Err(malformed.into()),
            };
            match &result {
                Ok(applied) => tracing::info!(
                    block,
                    entry = %applied.key,
                    command = %applied.command,
                    acl = %applied.acl,
                    "decision attached"
                ),
                Err(error) => tracing::warn!(block, %error, "directive not applied"),
            }
            reports.push(DirectiveReport { block, result });
        }
        reports
    }

    /// Authorize one directive for `signer` and attach its decision.
    pub async fn apply(
        &self,
        signer: &Fingerprint,
        directive: &Directive,
    ) -> Result<AppliedDirective, DirectiveError> {
        let queue = directive
            .queue
            .as_deref()
            .unwrap_or(&self.config.default_queue);
        let entry = self
            .store
            .find(queue, &directive.source, &directive.version)
            .await?;

        if let Some(stated) = &directive.suite
            && stated != entry.effective_suite()
        {
            return Err(DirectiveError::SuiteMismatch {
                stated: stated.clone(),
                effective: entry.effective_suite().to_string(),
            });
        }

        let permit = self
            .acl
            .resolve(signer)
            .authorize(&entry.authorization_target())?;

        let at = Utc::now();
        let reason = directive.reason.clone();
        let decision = match directive.command {
            Command::Accept => Decision::Accepted {
                by: *signer,
                at,
                reason,
            },
            Command::Reject => Decision::Rejected {
                by: *signer,
                at,
                reason,
            },
        };

        let key = entry.key();
        self.store.attach_decision(&key, decision).await?;
        Ok(AppliedDirective {
            key,
            command: directive.command,
            acl: permit.acl,
        })
    }
}

impl FileReport {
    fn failed(mut self, error: FileError) -> Self {
        tracing::warn!(file = %self.file.display(), %error, "command file left pending");
        self.status = FileStatus::Failed(error);
        self
    }
}

/// Move `file` into `dir`, appending `.1`, `.2`, ... if the name is taken.
async fn move_into(file: &Path, dir: &Path) -> Result<(), FileError> {
    let move_error = |e: std::io::Error| FileError::Move(format!("{}: {e}", file.display()));

    let Some(name) = file.file_name().map(|name| name.to_string_lossy().into_owned()) else {
        return Err(FileError::Move(format!("{} has no file name", file.display())));
    };
    tokio::fs::create_dir_all(dir).await.map_err(move_error)?;

    let mut target = dir.join(&name);
    let mut counter = 0;
    while tokio::fs::try_exists(&target).await.map_err(move_error)? {
        counter += 1;
        target = dir.join(format!("{name}.{counter}"));
    }
    tokio::fs::rename(file, &target).await.map_err(move_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LedgerError, MemoryLedger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use pretty_assertions::assert_eq;
    use warden_acl::{AccessControlTable, Acl, Denial};
    use warden_credentials::{Keyring, VerificationError};
    use warden_queue::{MemoryPolicyQueue, QueueEntry, QueueError};

    /// Treats the first line of a document as the signer's fingerprint and
    /// the rest as the payload.
    struct PlainVerifier;

    #[async_trait]
    impl DocumentVerifier for PlainVerifier {
        async fn verify(&self, document: &[u8]) -> Result<VerifiedDocument, VerificationError> {
            let text = std::str::from_utf8(document)
                .map_err(|e| VerificationError::InvalidSignature(e.to_string()))?;
            let (signer, payload) = text
                .split_once('\n')
                .ok_or_else(|| VerificationError::InvalidSignature("no signer line".into()))?;
            let fingerprint: Fingerprint = signer
                .parse()
                .map_err(|_| VerificationError::InvalidSignature("bad signer line".into()))?;
            Ok(VerifiedDocument {
                fingerprint,
                payload: payload.to_string(),
                signed_at: Utc::now(),
                digest: DocumentDigest::hash(document),
            })
        }
    }

    fn alice() -> Fingerprint {
        Fingerprint::from([0xa1; 20])
    }

    /// A ledger whose first lookup fails.
    #[derive(Default)]
    struct FlakyLedger {
        inner: MemoryLedger,
        failed: AtomicBool,
    }

    #[async_trait]
    impl Ledger for FlakyLedger {
        async fn contains(&self, digest: &DocumentDigest) -> Result<bool, LedgerError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(LedgerError::Storage("disk went away".into()));
            }
            self.inner.contains(digest).await
        }

        async fn record(
            &self,
            digest: &DocumentDigest,
            record: LedgerRecord,
        ) -> Result<bool, LedgerError> {
            self.inner.record(digest, record).await
        }

        async fn get(&self, digest: &DocumentDigest) -> Result<Option<LedgerRecord>, LedgerError> {
            self.inner.get(digest).await
        }
    }

    async fn processor(
        pending: &Path,
    ) -> anyhow::Result<CommandProcessor<PlainVerifier, MemoryPolicyQueue, MemoryLedger>> {
        processor_with_ledger(pending, MemoryLedger::new()).await
    }

    async fn processor_with_ledger<L: Ledger>(
        pending: &Path,
        ledger: L,
    ) -> anyhow::Result<CommandProcessor<PlainVerifier, MemoryPolicyQueue, L>> {
        let store = MemoryPolicyQueue::new();
        store
            .insert(QueueEntry::new("unchecked", "foo", "1.0", "unstable").with_owner(alice()))
            .await?;
        let acl = AccessControlStore::new(
            AccessControlTable::default()
                .with_keyring(Keyring::new("empty"))
                .with_acl(Acl::new("owners").with_all_capabilities().with_fingerprint(alice())),
        );
        Ok(CommandProcessor::new(
            PlainVerifier,
            store,
            ledger,
            acl,
            CommandProcessorConfig::new(CommandDirectories::under(pending)),
        ))
    }

    fn document(signer: &Fingerprint, directives: &[Directive]) -> String {
        let blocks: Vec<String> = directives.iter().map(ToString::to_string).collect();
        format!("{signer}\n{}", blocks.join("\n"))
    }

    #[tokio::test]
    async fn it_attaches_permitted_decisions() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(tempdir.path()).await?;
        std::fs::write(
            tempdir.path().join("a.cmd"),
            document(&alice(), &[Directive::accept("foo", "1.0")]),
        )?;

        let report = processor.process_pending().await?;
        assert!(!report.has_failures());
        assert_eq!(report.applied().count(), 1);

        let entry = processor.store.find("unchecked", "foo", "1.0").await?;
        assert_eq!(entry.decision.decided_by(), Some(&alice()));
        assert!(tempdir.path().join("done/a.cmd").exists());
        assert!(!tempdir.path().join("a.cmd").exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_reports_each_directive_separately() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(tempdir.path()).await?;
        let payload = format!(
            "{}\nAction: process-upload\nCommand: ACCEPT\n\n{}\n{}",
            alice(),
            Directive::accept("bar", "2.0"),
            Directive::reject("foo", "1.0").for_suite("stable"),
        );
        std::fs::write(tempdir.path().join("a.cmd"), payload)?;

        let report = processor.process_pending().await?;
        let FileStatus::Processed { directives, .. } = &report.files[0].status else {
            panic!("unexpected status {:?}", report.files[0].status);
        };
        assert!(matches!(directives[0].result, Err(DirectiveError::Malformed(_))));
        assert_eq!(
            directives[1].result,
            Err(DirectiveError::Queue(QueueError::NotFound(
                warden_queue::EntryKey::new("unchecked", "bar", "2.0")
            )))
        );
        assert_eq!(
            directives[2].result,
            Err(DirectiveError::SuiteMismatch {
                stated: "stable".into(),
                effective: "unstable".into(),
            })
        );
        assert!(report.has_failures());
        Ok(())
    }

    #[tokio::test]
    async fn it_denies_signers_without_acls() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(tempdir.path()).await?;
        let mallory = Fingerprint::from([0x66; 20]);
        std::fs::write(
            tempdir.path().join("m.cmd"),
            document(&mallory, &[Directive::accept("foo", "1.0")]),
        )?;

        let report = processor.process_pending().await?;
        let rejected: Vec<_> = report.rejected().map(|(_, error)| error.clone()).collect();
        assert!(matches!(
            rejected.as_slice(),
            [DirectiveError::Denied(Denial::CapabilityNotGranted { acl: None, .. })]
        ));
        // A denial is an expected outcome, not a failed run
        assert!(!report.has_failures());
        Ok(())
    }

    #[tokio::test]
    async fn it_moves_unverifiable_files_aside() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(tempdir.path()).await?;
        std::fs::write(tempdir.path().join("junk.cmd"), "no signature here")?;

        let report = processor.process_pending().await?;
        assert!(matches!(
            report.files[0].status,
            FileStatus::Unverified(VerificationError::InvalidSignature(_))
        ));
        assert!(report.has_failures());
        assert!(tempdir.path().join("rejected/junk.cmd").exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_consumes_copies_of_a_document_once() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(tempdir.path()).await?;
        let text = document(&alice(), &[Directive::accept("foo", "1.0")]);
        std::fs::write(tempdir.path().join("a.cmd"), &text)?;
        std::fs::write(tempdir.path().join("b.cmd"), &text)?;

        let report = processor.process_pending().await?;
        let consumed = report
            .files
            .iter()
            .filter(|file| file.status == FileStatus::AlreadyConsumed)
            .count();
        assert_eq!(consumed, 1);
        assert_eq!(report.applied().count(), 1);
        assert!(!report.has_failures());

        // Resubmitting after the run is a no-op too
        std::fs::write(tempdir.path().join("c.cmd"), &text)?;
        let report = processor.process_pending().await?;
        assert_eq!(report.files[0].status, FileStatus::AlreadyConsumed);
        assert!(tempdir.path().join("done/c.cmd").exists());
        Ok(())
    }

    #[tokio::test]
    async fn it_does_not_let_a_failed_copy_shadow_its_twin() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor_with_ledger(tempdir.path(), FlakyLedger::default()).await?;
        let text = document(&alice(), &[Directive::accept("foo", "1.0")]);
        std::fs::write(tempdir.path().join("a.cmd"), &text)?;
        std::fs::write(tempdir.path().join("b.cmd"), &text)?;

        let report = processor.process_pending().await?;
        let failed: Vec<_> = report
            .files
            .iter()
            .filter(|file| matches!(file.status, FileStatus::Failed(FileError::Ledger(_))))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(report.applied().count(), 1);
        assert!(failed[0].file.exists());

        let entry = processor.store.find("unchecked", "foo", "1.0").await?;
        assert_eq!(entry.decision.decided_by(), Some(&alice()));
        Ok(())
    }

    #[tokio::test]
    async fn it_finds_nothing_to_do_without_a_pending_directory() -> anyhow::Result<()> {
        let tempdir = tempfile::tempdir()?;
        let processor = processor(&tempdir.path().join("missing")).await?;
        assert_eq!(processor.process_pending().await?, RunReport::default());
        Ok(())
    }
}
