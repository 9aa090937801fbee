#![warn(missing_docs)]

//! Who may decide what.
//!
//! An [`Acl`] bundles capability flags with optional per-source and
//! per-suite allow-lists. Signers hold an ACL either through membership in
//! its match keyring or by being listed on it explicitly. The
//! [`AccessControlStore`] is a read-mostly snapshot of all keyrings and ACLs
//! that resolves a signer to their [`Entitlements`], which in turn decide
//! whether a directive against an [`AuthorizationTarget`] is permitted.
//!
//! Trust is a flat union: a directive is permitted if any one held ACL
//! permits it.

mod admin;
pub use admin::*;

mod decider;
pub use decider::*;

mod error;
pub use error::*;

mod model;
pub use model::*;

mod store;
pub use store::*;

mod table;
pub use table::*;
