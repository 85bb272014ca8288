//! Log tail collation.
//!
//! The collator folds pages of tag-filtered listing results into one
//! [`LogTail`] per (log, kind): the massif or checkpoint with the highest
//! index seen so far for that log.

use std::collections::HashMap;

use talus_core::paths::{LogPaths, ObjectKind};
use talus_core::store::FilteredItem;
use talus_core::tags::get_last_id_hex;
use talus_core::{LogId, Result};

/// The newest known object of one kind for one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTail {
    /// The log this tail belongs to.
    pub log_id: LogId,
    /// Storage path of the tail object.
    pub path: String,
    /// Massif index parsed from the path.
    pub index: u32,
    /// Whether this tail is a massif or a checkpoint.
    pub kind: ObjectKind,
    /// The object's `lastid` tag value; empty when the index had none.
    pub last_id: String,
}

impl LogTail {
    /// Replaces this tail when `other` is the same log and kind with a
    /// strictly greater index. Returns whether a replacement happened.
    pub fn try_replace(&mut self, other: &LogTail) -> bool {
        if self.log_id != other.log_id || self.kind != other.kind {
            return false;
        }
        if other.index <= self.index {
            return false;
        }
        *self = other.clone();
        true
    }
}

/// Collates the most recently modified massif and checkpoint paths for all
/// logs seen within a filter window.
#[derive(Debug, Default)]
pub struct LogTailCollator {
    massifs: HashMap<LogId, LogTail>,
    checkpoints: HashMap<LogId, LogTail>,
}

impl LogTailCollator {
    /// Creates an empty collator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processes a single page of filter results.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature reserves the right to fail so
    /// page sources can stop early.
    pub fn collate_page(&mut self, page: &[FilteredItem]) -> Result<()> {
        for item in page {
            self.collate_path(&item.path, get_last_id_hex(&item.tags));
        }
        Ok(())
    }

    /// Folds one path into the tails. Paths that don't carry a log identity
    /// or a recognised object suffix are skipped; the filter index can
    /// surface unrelated blobs.
    pub fn collate_path(&mut self, path: &str, last_id: &str) {
        let log_id = match LogId::from_tenant_path(path) {
            Ok(Some(log_id)) => log_id,
            Ok(None) | Err(_) => {
                tracing::debug!(path, "skipping path without a log identity");
                return;
            }
        };
        let Ok((kind, index)) = LogPaths::kind_and_index(path) else {
            tracing::debug!(path, "skipping path without an object suffix");
            return;
        };

        let tail = LogTail {
            log_id,
            path: path.to_string(),
            index,
            kind,
            last_id: last_id.to_string(),
        };
        let map = match kind {
            ObjectKind::Checkpoint => &mut self.checkpoints,
            _ => &mut self.massifs,
        };
        match map.entry(log_id) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                entry.get_mut().try_replace(&tail);
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(tail);
            }
        }
    }

    /// All collated tails of a kind. Order is unspecified; the watcher
    /// shuffles before reporting.
    #[must_use]
    pub fn tails(&self, kind: ObjectKind) -> Vec<&LogTail> {
        let map = match kind {
            ObjectKind::Checkpoint => &self.checkpoints,
            _ => &self.massifs,
        };
        map.values().collect()
    }

    /// The tail of a kind for one log, when one was seen.
    #[must_use]
    pub fn tail(&self, log_id: &LogId, kind: ObjectKind) -> Option<&LogTail> {
        let map = match kind {
            ObjectKind::Checkpoint => &self.checkpoints,
            _ => &self.massifs,
        };
        map.get(log_id)
    }
}
