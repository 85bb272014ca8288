//! Canonical storage paths for talus logs.
//!
//! This module is the single source of truth for blob path construction. No
//! hardcoded path strings should exist outside it.
//!
//! # Path Layout
//!
//! ```text
//! v1/mmrs/tenant/{uuid}/{instance}/
//! ├── massifs/
//! │   └── {index:016}.log
//! └── massifseals/
//!     └── {index:016}.sth
//! ```
//!
//! Basenames are fixed-width zero-padded decimal so that lexical listing
//! under a prefix returns objects in ascending massif index order.

use crate::error::{Error, Result};
use crate::log_id::LogId;

/// Versioned root prefix for all massif storage.
pub const V1_MMR_PREFIX: &str = "v1/mmrs";

/// Log instance number; reserved for future massif height migrations.
pub const LOG_INSTANCE: u32 = 0;

/// Extension for massif data blobs.
pub const MASSIF_EXT: &str = "log";

/// Extension for checkpoint (signed tree head) blobs.
pub const CHECKPOINT_EXT: &str = "sth";

/// The kinds of object the storage schema distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A complete massif data blob.
    MassifData,
    /// The header prefix of a massif data blob; shares the massif's path.
    MassifStart,
    /// A detached signed tree head.
    Checkpoint,
    /// The massifs directory prefix (listing only).
    MassifsRoot,
    /// The checkpoints directory prefix (listing only).
    CheckpointsRoot,
}

impl ObjectKind {
    /// True for the kinds that name an indexed object rather than a prefix.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::MassifData | Self::MassifStart | Self::Checkpoint)
    }
}

/// Canonical path generator for a log's storage.
pub struct LogPaths;

impl LogPaths {
    /// Returns the directory-like prefix for a (log, kind) pair.
    #[must_use]
    pub fn prefix(log_id: &LogId, kind: ObjectKind) -> String {
        let dir = match kind {
            ObjectKind::MassifData | ObjectKind::MassifStart | ObjectKind::MassifsRoot => {
                "massifs"
            }
            ObjectKind::Checkpoint | ObjectKind::CheckpointsRoot => "massifseals",
        };
        format!(
            "{V1_MMR_PREFIX}/{}/{LOG_INSTANCE}/{dir}/",
            log_id.tenant_segment()
        )
    }

    /// Returns the storage path for an indexed object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for the prefix-only kinds; use
    /// [`LogPaths::prefix`] for those.
    pub fn object_path(log_id: &LogId, kind: ObjectKind, massif_index: u32) -> Result<String> {
        let ext = match kind {
            ObjectKind::MassifData | ObjectKind::MassifStart => MASSIF_EXT,
            ObjectKind::Checkpoint => CHECKPOINT_EXT,
            ObjectKind::MassifsRoot | ObjectKind::CheckpointsRoot => {
                return Err(Error::InvalidInput(format!(
                    "object kind {kind:?} names a prefix, not an object"
                )))
            }
        };
        Ok(format!(
            "{}{massif_index:016}.{ext}",
            Self::prefix(log_id, kind)
        ))
    }

    /// Recovers the massif index from a storage path.
    ///
    /// The kind restricts which extensions are accepted: massif kinds accept
    /// `.log`, checkpoints accept `.sth`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] on a malformed basename and
    /// [`Error::InvalidInput`] for prefix-only kinds.
    pub fn object_index(path: &str, kind: ObjectKind) -> Result<u32> {
        let (parsed, index) = Self::kind_and_index(path)?;
        match kind {
            ObjectKind::MassifData | ObjectKind::MassifStart
                if parsed == ObjectKind::MassifData =>
            {
                Ok(index)
            }
            ObjectKind::Checkpoint if parsed == ObjectKind::Checkpoint => Ok(index),
            ObjectKind::MassifsRoot | ObjectKind::CheckpointsRoot => Err(Error::InvalidInput(
                format!("object kind {kind:?} names a prefix, not an object"),
            )),
            _ => Err(Error::InvalidPath(path.to_string())),
        }
    }

    /// Recovers the object kind and massif index from a storage path.
    ///
    /// The kind is restricted to the indexed kinds; the header pseudo-kind is
    /// reported as [`ObjectKind::MassifData`] because they share a path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] when the basename has no recognised
    /// extension or its stem is not a decimal index.
    pub fn kind_and_index(path: &str) -> Result<(ObjectKind, u32)> {
        let trimmed = path.trim_end_matches('/');
        let base = trimmed.rsplit('/').next().unwrap_or(trimmed);

        let (stem, kind) = if let Some(stem) = base.strip_suffix(".log") {
            (stem, ObjectKind::MassifData)
        } else if let Some(stem) = base.strip_suffix(".sth") {
            (stem, ObjectKind::Checkpoint)
        } else {
            return Err(Error::InvalidPath(path.to_string()));
        };

        let index: u32 = stem
            .parse()
            .map_err(|_| Error::InvalidPath(path.to_string()))?;
        Ok((kind, index))
    }
}
