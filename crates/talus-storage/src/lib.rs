//! # talus-storage
//!
//! The storage engine for talus massif logs: a per-log caching layer over
//! the object store port, and the append-commit engine that enforces
//! at-most-one-writer semantics with optimistic concurrency control.
//!
//! ## Components
//!
//! - [`blob`]: per-blob contexts and head discovery by prefix listing
//! - [`store`]: the [`CachingStore`] — per-log caches, partial reads,
//!   etag-tracked native contexts, OCC writes
//! - [`committer`]: the [`MassifCommitter`] — selects the append target,
//!   enforces the overfill rule, commits with conditional writes
//!
//! ## Concurrency model
//!
//! The engine owns no threads. Operations are serial with respect to a
//! single selected log; concurrent operations against the same selected log
//! are not supported. Parallelism across logs is achieved with separate
//! engine instances sharing one store adapter. In-flight operations are
//! cancelled by dropping their futures; any partially populated cache entry
//! is left intact and re-guarded by its etag on next access.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod blob;
pub mod committer;
pub mod store;

pub use blob::{first_prefixed_blob, last_prefixed_blob, prefixed_blob_tail, BlobContext};
pub use committer::{CommitterOptions, MassifCommitter};
pub use store::{CachingStore, StorageOptions, StoreOptions, VerifiedContext};
