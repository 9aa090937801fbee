#![warn(missing_docs)]

//! Policy queues.
//!
//! A policy queue holds uploads that landed in a suite requiring
//! moderation. Each [`QueueEntry`] waits there until a signed command
//! attaches a [`Decision`], after which the [`PolicyQueueProcessor`] either
//! promotes its artifacts into the destination suite or sends them to the
//! morgue, and removes the entry.
//!
//! Storage is abstracted by [`PolicyQueueStore`] (in memory or on the
//! filesystem) and artifact movement by [`ArtifactArchive`].

mod archive;
pub use archive::*;

mod entry;
pub use entry::*;

mod error;
pub use error::*;

mod listing;
pub use listing::*;

mod processor;
pub use processor::*;

mod store;
pub use store::*;

mod suite;
pub use suite::*;
