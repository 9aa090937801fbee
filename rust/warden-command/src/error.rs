use std::time::Duration;

use thiserror::Error;
use warden_acl::Denial;
use warden_queue::QueueError;

/// What is wrong with one directive block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveProblem {
    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// The `Action` field names an action nobody handles.
    #[error("unknown action '{0}'")]
    UnknownAction(String),

    /// The `Command` field is neither ACCEPT nor REJECT.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A field appears twice in the same block.
    #[error("duplicate field '{0}'")]
    DuplicateField(String),

    /// An indented line with no field to continue.
    #[error("continuation line {0} does not follow a field")]
    OrphanContinuation(usize),

    /// A line that is neither a field, a continuation nor a comment.
    #[error("line {0} is not a 'Field: value' line")]
    NotAField(usize),

    /// A required field is present but blank.
    #[error("field '{0}' is empty")]
    EmptyField(&'static str),
}

/// A directive block that could not be parsed. Only that block is lost; its
/// siblings are parsed independently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("directive {block}: {problem}")]
pub struct MalformedDirective {
    /// Zero-based position of the block in the document.
    pub block: usize,
    /// What is wrong with it.
    pub problem: DirectiveProblem,
}

/// Errors from a [`crate::Ledger`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The storage backend failed.
    #[error("ledger storage error: {0}")]
    Storage(String),
}

/// Why a command file could not be processed at all. Files failing this way
/// stay in the pending directory and are retried on the next run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    /// The file could not be read.
    #[error("cannot read command file: {0}")]
    Read(String),

    /// Reading the file did not finish in time.
    #[error("reading the command file timed out after {0:?}")]
    ReadTimeout(Duration),

    /// Verification did not finish in time.
    #[error("verification timed out after {0:?}")]
    VerifyTimeout(Duration),

    /// The ledger could not be consulted or updated.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The file could not be moved out of the pending directory.
    #[error("cannot move command file: {0}")]
    Move(String),
}

/// Why a well-formed directive was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
    /// The block could not be parsed.
    #[error(transparent)]
    Malformed(#[from] MalformedDirective),

    /// The signer may not make this decision.
    #[error("denied: {0}")]
    Denied(#[from] Denial),

    /// The queue refused the decision, or the entry is missing.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The directive names a destination the entry is not headed to.
    #[error("directive targets suite '{stated}' but the entry goes to '{effective}'")]
    SuiteMismatch {
        /// The suite named in the directive.
        stated: String,
        /// Where the entry would actually be promoted.
        effective: String,
    },
}
