#![warn(missing_docs)]

//! Signed moderation commands.
//!
//! Operators decide what happens to uploads waiting in a policy queue by
//! dropping clearsigned command files into a pending directory. A command
//! file holds one or more [`Directive`]s in a small RFC822-like format:
//!
//! ```text
//! Action: process-upload
//! Command: ACCEPT
//! Source: hello
//! Version: 2.10-3
//!
//! Action: process-upload
//! Command: REJECT
//! Source: foo
//! Version: 1.0
//! Reason: License is not DFSG-free.
//!  .
//!  Please repack without the firmware blobs.
//! ```
//!
//! The [`CommandProcessor`] verifies each file, parses its directives,
//! authorizes each one against the signer's ACLs and attaches the resulting
//! decision to the matching queue entry. Each signed document is processed at
//! most once, however it is wrapped: the digest of what was signed is
//! recorded in a [`Ledger`].

mod directive;
pub use directive::*;

mod error;
pub use error::*;

mod ledger;
pub use ledger::*;

mod processor;
pub use processor::*;

mod report;
pub use report::*;
