#![warn(missing_docs)]

//! Signing identities and signed command documents.
//!
//! Every command that reaches the archive is a small text document that was
//! clearsigned by a human operator. This crate owns everything needed to turn
//! such a document back into a trustworthy `(fingerprint, payload)` pair:
//!
//! - [`Fingerprint`]: the stable identifier of a signing key
//! - [`PublicKey`] / [`Ed25519Signer`]: Ed25519 key material, with `did:key`
//!   text encoding for public keys
//! - [`Keyring`]: a named set of public keys
//! - [`ClearSigned`]: the armored document format
//! - [`DocumentVerifier`]: the verification capability consumed by command
//!   processing, with [`KeyringVerifier`] as the concrete implementation
//!
//! # Example
//!
//! ```rust
//! use warden_credentials::{
//!     ClearSigner, DocumentVerifier, Ed25519Signer, Keyring, KeyringVerifier,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = Ed25519Signer::import(&[7u8; 32]);
//! let keyring = Keyring::new("operators").with_key(signer.public_key());
//!
//! let document = ClearSigner::new(signer.clone()).sign("Action: process-upload\n");
//!
//! let verified = KeyringVerifier::new([&keyring])
//!     .verify(document.as_bytes())
//!     .await?;
//!
//! assert_eq!(verified.fingerprint, signer.fingerprint());
//! # Ok(())
//! # }
//! ```

mod armor;
pub use armor::*;

mod digest;
pub use digest::*;

mod error;
pub use error::*;

mod fingerprint;
pub use fingerprint::*;

mod key;
pub use key::*;

mod keyring;
pub use keyring::*;

mod signer;
pub use signer::*;

mod verifier;
pub use verifier::*;
