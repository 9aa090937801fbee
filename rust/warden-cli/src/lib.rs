//! # Warden CLI
//!
//! The operator-facing front end: processes pending command files, applies
//! policy queue decisions, and administers keys and ACLs.
//!
//! ## Usage
//!
//! ```bash
//! warden --config /srv/archive/warden.json process-commands
//! warden process-policy unchecked
//! warden acl allow process-upload 0123ABCD... hello --reason "new maintainer"
//! warden sign --key alice.key decision.txt --out commands/decision.cmd
//! ```

mod app;
pub use app::*;

mod cli;
pub use cli::*;

mod config;
pub use config::*;

mod logging;
pub use logging::*;
