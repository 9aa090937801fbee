use std::{fmt, path::PathBuf};

use warden_credentials::{DocumentDigest, Fingerprint, VerificationError};
use warden_queue::EntryKey;

use crate::{Command, DirectiveError, FileError};

/// A decision that was attached to a queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedDirective {
    /// The entry that now carries the decision.
    pub key: EntryKey,
    /// Accept or reject.
    pub command: Command,
    /// The ACL that permitted it.
    pub acl: String,
}

/// The result of one directive of a command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveReport {
    /// Zero-based position of the directive block in the document.
    pub block: usize,
    /// What happened.
    pub result: Result<AppliedDirective, DirectiveError>,
}

/// What became of one command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// The document was verified and its directives were handled.
    Processed {
        /// The signer.
        fingerprint: Fingerprint,
        /// One report per directive block, in document order.
        directives: Vec<DirectiveReport>,
    },
    /// The same signed bytes were consumed before. Nothing was done.
    AlreadyConsumed,
    /// The document failed verification and was moved aside.
    Unverified(VerificationError),
    /// The file could not be handled and was left pending.
    Failed(FileError),
}

/// The outcome for one command file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    /// Path of the file in the pending directory.
    pub file: PathBuf,
    /// Content digest, once the file could be read.
    pub digest: Option<DocumentDigest>,
    /// What happened.
    pub status: FileStatus,
}

impl FileReport {
    /// Whether this file counts against the run: it failed verification,
    /// could not be handled, or contained a malformed directive.
    pub fn is_failure(&self) -> bool {
        match &self.status {
            FileStatus::Processed { directives, .. } => directives
                .iter()
                .any(|directive| matches!(directive.result, Err(DirectiveError::Malformed(_)))),
            FileStatus::AlreadyConsumed => false,
            FileStatus::Unverified(_) | FileStatus::Failed(_) => true,
        }
    }

    /// The signer, when known.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match &self.status {
            FileStatus::Processed { fingerprint, .. } => Some(fingerprint),
            _ => None,
        }
    }
}

/// The outcome of one run over the pending directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One report per file, ordered by path.
    pub files: Vec<FileReport>,
}

impl RunReport {
    /// Whether the run should exit unsuccessfully.
    pub fn has_failures(&self) -> bool {
        self.files.iter().any(FileReport::is_failure)
    }

    /// Every attached decision.
    pub fn applied(&self) -> impl Iterator<Item = &AppliedDirective> {
        self.directives()
            .filter_map(|(_, directive)| directive.result.as_ref().ok())
    }

    /// Every directive that was not applied, with the file it came from.
    pub fn rejected(&self) -> impl Iterator<Item = (&FileReport, &DirectiveError)> {
        self.directives()
            .filter_map(|(file, directive)| directive.result.as_ref().err().map(|e| (file, e)))
    }

    fn directives(&self) -> impl Iterator<Item = (&FileReport, &DirectiveReport)> {
        self.files.iter().flat_map(|file| {
            let directives = match &file.status {
                FileStatus::Processed { directives, .. } => directives.as_slice(),
                _ => &[],
            };
            directives.iter().map(move |directive| (file, directive))
        })
    }
}

/// One line per file, then one indented line per directive.
impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.files {
            let file = report.file.display();
            match &report.status {
                FileStatus::Processed {
                    fingerprint,
                    directives,
                } => {
                    writeln!(f, "{file}: signed by {fingerprint}")?;
                    for directive in directives {
                        match &directive.result {
                            Ok(applied) => writeln!(
                                f,
                                "  [{}] {} {} (acl {})",
                                directive.block, applied.command, applied.key, applied.acl
                            )?,
                            Err(error) => writeln!(f, "  [{}] {error}", directive.block)?,
                        }
                    }
                }
                FileStatus::AlreadyConsumed => writeln!(f, "{file}: already consumed")?,
                FileStatus::Unverified(error) => writeln!(f, "{file}: {error}")?,
                FileStatus::Failed(error) => writeln!(f, "{file}: {error} (left pending)")?,
            }
        }
        Ok(())
    }
}
