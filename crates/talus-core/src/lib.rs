//! # talus-core
//!
//! Core abstractions for the talus massif log storage engine.
//!
//! A talus log is an append-only Merkle Mountain Range persisted as a series
//! of fixed-layout "massif" blobs plus detached signed checkpoints in an
//! object store. This crate provides the primitives shared by every talus
//! component:
//!
//! - **Log identity**: [`LogId`] and its storage path rendering
//! - **Schemas**: blob paths ([`paths`]), blob tags ([`tags`]), the massif
//!   binary layout ([`massif`]) and snowflake id timestamps ([`idtimestamp`])
//! - **Storage port**: capability-split object store traits ([`store`]) and
//!   an in-memory implementation ([`memory`])
//! - **Error types**: the shared [`Error`] taxonomy
//!
//! ## Crate Boundary
//!
//! `talus-core` is the only crate allowed to define shared primitives. The
//! engine crates (`talus-storage`, `talus-watch`) interact with object
//! stores exclusively through the port defined here.
//!
//! ## Example
//!
//! ```rust
//! use talus_core::prelude::*;
//!
//! let log_id = LogId::new([1u8; 16]);
//! let path = LogPaths::object_path(&log_id, ObjectKind::MassifData, 0).unwrap();
//! assert!(path.ends_with("/massifs/0000000000000000.log"));
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod checkpoint;
pub mod error;
pub mod idtimestamp;
pub mod log_id;
pub mod massif;
pub mod memory;
pub mod mmr;
pub mod observability;
pub mod paths;
pub mod store;
pub mod tags;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use talus_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::checkpoint::{Checkpoint, CheckpointDecoder, CheckpointVerifier, MmrState};
    pub use crate::error::{Error, Result};
    pub use crate::log_id::LogId;
    pub use crate::massif::{MassifContext, MassifStart};
    pub use crate::memory::MemoryStore;
    pub use crate::paths::{LogPaths, ObjectKind};
    pub use crate::store::{
        FilterPage, FilteredItem, HasCapability, ListOptions, ListPage, ObjectLister,
        ObjectReader, ObjectWriter, ReadOptions, ReadResponse, StoreFeature, TagFilter,
        WriteOptions, WriteResponse,
    };
    pub use crate::tags::TagMap;
}

// Re-export key types at crate root for ergonomics
pub use checkpoint::{Checkpoint, CheckpointDecoder, CheckpointVerifier, MmrState};
pub use error::{Error, Result};
pub use log_id::LogId;
pub use massif::{MassifContext, MassifStart};
pub use memory::MemoryStore;
pub use observability::{init_logging, LogFormat};
pub use paths::{LogPaths, ObjectKind};
pub use store::{
    FilterPage, FilteredItem, HasCapability, ListOptions, ListPage, ObjectLister, ObjectReader,
    ObjectWriter, ReadOptions, ReadResponse, StoreFeature, TagFilter, WriteOptions, WriteResponse,
};
pub use tags::TagMap;
