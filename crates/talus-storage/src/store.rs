//! The caching object store.
//!
//! [`CachingStore`] wraps the raw object store port with per-log caches:
//! native blob contexts keyed by `(kind, massif index)`, decoded start
//! headers, and decoded checkpoints. Access is scoped to one *selected* log
//! at a time; with this implementation, random log access would deserve a
//! more considered design.
//!
//! # Partial reads
//!
//! Listing and header reads populate contexts without a full body. The cache
//! tracks whether stored bytes are header-only and upgrades to a full
//! re-read whenever a body consumer asks, so head discovery never pays for
//! body bandwidth it does not need.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use talus_core::checkpoint::{Checkpoint, CheckpointDecoder, CheckpointVerifier, MmrState};
use talus_core::error::{Error, Result};
use talus_core::massif::{read_height, MassifContext, MassifStart, NODE_SIZE};
use talus_core::paths::{LogPaths, ObjectKind};
use talus_core::store::{
    HasCapability, ObjectLister, ObjectReader, ObjectWriter, ReadOptions, StoreFeature,
    WriteOptions, WriteResponse,
};
use talus_core::{mmr, LogId};

use crate::blob::{last_prefixed_blob, BlobContext};

/// Storage-wide defaults shared by readers and the committer.
#[derive(Debug, Clone, Copy)]
pub struct StorageOptions {
    /// Commitment epoch for id timestamps. Epoch 1 is good until the end of
    /// the 32 bit unix range.
    pub commitment_epoch: u32,
    /// Massif height for new logs.
    pub massif_height: u8,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            commitment_epoch: 1,
            massif_height: 14,
        }
    }
}

/// Construction options for [`CachingStore`].
#[derive(Clone, Default)]
pub struct StoreOptions {
    /// Storage-wide defaults.
    pub storage: StorageOptions,
    /// Writer handle; absent for read-only deployments.
    pub writer: Option<Arc<dyn ObjectWriter>>,
    /// Checkpoint envelope decoder; required for checkpoint reads.
    pub checkpoint_decoder: Option<Arc<dyn CheckpointDecoder>>,
    /// Checkpoint signature verifier; required for verified contexts.
    pub checkpoint_verifier: Option<Arc<dyn CheckpointVerifier>>,
}

/// Per-log cache: native blob contexts plus decoded entities.
#[derive(Debug, Default)]
struct LogCache {
    massifs: HashMap<u32, BlobContext>,
    checkpoints: HashMap<u32, BlobContext>,
    starts: HashMap<u32, MassifStart>,
    checkpoint_cache: HashMap<u32, Checkpoint>,
    last_massif_index: Option<u32>,
    last_checkpoint_index: Option<u32>,
}

/// A massif context paired with the checkpoint state that vouches for it.
#[derive(Debug, Clone)]
pub struct VerifiedContext {
    /// The massif whose bytes were checked against the state.
    pub massif: MassifContext,
    /// The signed state.
    pub state: MmrState,
}

/// Caching store over an object store adapter.
///
/// Mutated only by the operation currently running against it; concurrent
/// operations on the same selected log are not supported.
pub struct CachingStore<S> {
    store: Arc<S>,
    opts: StoreOptions,
    caches: HashMap<LogId, LogCache>,
    selected: Option<LogId>,
}

impl<S> CachingStore<S>
where
    S: ObjectReader + ObjectLister + Send + Sync,
{
    /// Creates a caching store over the given adapter.
    #[must_use]
    pub fn new(store: Arc<S>, opts: StoreOptions) -> Self {
        Self {
            store,
            opts,
            caches: HashMap::new(),
            selected: None,
        }
    }

    /// The storage defaults this store was opened with.
    #[must_use]
    pub fn storage_options(&self) -> StorageOptions {
        self.opts.storage
    }

    /// The currently selected log, if any.
    #[must_use]
    pub fn selected_log(&self) -> Option<LogId> {
        self.selected
    }

    /// Selects a log, creating its cache on first use. Re-selecting the
    /// current log is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for the nil log id.
    pub fn select_log(&mut self, log_id: LogId) -> Result<()> {
        if log_id.is_nil() {
            return Err(Error::InvalidInput("log id cannot be nil".into()));
        }
        if self.selected == Some(log_id) {
            return Ok(());
        }
        self.caches.entry(log_id).or_default();
        self.selected = Some(log_id);
        Ok(())
    }

    /// Releases a log's cache, clearing the selection when it was selected.
    pub fn drop_log(&mut self, log_id: &LogId) {
        self.caches.remove(log_id);
        if self.selected.as_ref() == Some(log_id) {
            self.selected = None;
        }
    }

    /// Drops cached resources for one massif index.
    ///
    /// Massif kinds drop only the massif data; the checkpoint kind drops
    /// only the checkpoint; any other kind drops everything at the index.
    pub fn drop_index(&mut self, massif_index: u32, kind: ObjectKind) {
        let Some(cache) = self.selected.and_then(|id| self.caches.get_mut(&id)) else {
            return;
        };
        match kind {
            ObjectKind::MassifData | ObjectKind::MassifStart => {
                cache.massifs.remove(&massif_index);
                cache.starts.remove(&massif_index);
            }
            ObjectKind::Checkpoint => {
                cache.checkpoints.remove(&massif_index);
                cache.checkpoint_cache.remove(&massif_index);
            }
            ObjectKind::MassifsRoot | ObjectKind::CheckpointsRoot => {
                cache.massifs.remove(&massif_index);
                cache.starts.remove(&massif_index);
                cache.checkpoints.remove(&massif_index);
                cache.checkpoint_cache.remove(&massif_index);
            }
        }
    }

    /// Finds the head index for a kind by listing the log's prefix to
    /// exhaustion.
    ///
    /// Side effect: the final item's metadata seeds the native cache, so a
    /// following read can use its etag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogEmpty`] when no objects exist for the kind.
    pub async fn head_index(&mut self, kind: ObjectKind) -> Result<u32> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;
        let prefix = LogPaths::prefix(&log_id, kind);

        let (bc, count) = last_prefixed_blob(self.store.as_ref(), &prefix).await?;
        if count == 0 {
            return Err(Error::LogEmpty);
        }
        let bc = bc.ok_or_else(|| Error::internal("non-empty listing without a final item"))?;
        let massif_index = LogPaths::object_index(&bc.path, kind)?;

        let cache = self.cache_mut()?;
        match kind {
            ObjectKind::Checkpoint | ObjectKind::CheckpointsRoot => {
                cache.checkpoints.insert(massif_index, bc);
                cache.last_checkpoint_index = Some(massif_index);
            }
            _ => {
                cache.massifs.insert(massif_index, bc);
                cache.last_massif_index = Some(massif_index);
            }
        }
        Ok(massif_index)
    }

    /// Returns the decoded start header for a massif, reading at most the
    /// header bytes when nothing is cached.
    pub async fn get_start(&mut self, massif_index: u32) -> Result<MassifStart> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;

        if let Some(start) = self.cache()?.starts.get(&massif_index) {
            return Ok(start.clone());
        }

        // Any cached body of at least header length will do; otherwise a
        // header-only read seeds the native cache without the body cost.
        let cached = self
            .cache()?
            .massifs
            .get(&massif_index)
            .filter(|bc| bc.has_start_data())
            .cloned();
        let bc = match cached {
            Some(bc) => bc,
            None => {
                let path = LogPaths::object_path(&log_id, ObjectKind::MassifData, massif_index)?;
                let mut bc = BlobContext::new(path);
                bc.read_start(self.store.as_ref()).await?;
                self.cache_mut()?.massifs.insert(massif_index, bc.clone());
                bc
            }
        };

        let start = MassifStart::decode(&bc.data)?;
        self.cache_mut()?
            .starts
            .insert(massif_index, start.clone());
        Ok(start)
    }

    /// Returns the full body of a massif, upgrading a header-only cache
    /// entry with a full re-read.
    pub async fn get_data(&mut self, massif_index: u32) -> Result<Bytes> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;

        if let Some(bc) = self.cache()?.massifs.get(&massif_index) {
            if bc.has_full_data() {
                return Ok(bc.data.clone());
            }
        }

        let path = LogPaths::object_path(&log_id, ObjectKind::MassifData, massif_index)?;
        let mut bc = BlobContext::new(path);
        bc.read_data(self.store.as_ref(), ReadOptions::with_tags())
            .await?;
        let data = bc.data.clone();
        self.cache_mut()?.massifs.insert(massif_index, bc);
        Ok(data)
    }

    /// Returns the decoded checkpoint for a massif index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpConfigMissing`] when no checkpoint decoder was
    /// configured.
    pub async fn get_checkpoint(&mut self, massif_index: u32) -> Result<Checkpoint> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;
        let decoder = self
            .opts
            .checkpoint_decoder
            .clone()
            .ok_or(Error::OpConfigMissing("checkpoint decoder"))?;

        if let Some(ckpt) = self.cache()?.checkpoint_cache.get(&massif_index) {
            return Ok(ckpt.clone());
        }

        let cached = self
            .cache()?
            .checkpoints
            .get(&massif_index)
            .filter(|bc| bc.has_full_data())
            .cloned();
        let bc = match cached {
            Some(bc) => bc,
            None => {
                let path = LogPaths::object_path(&log_id, ObjectKind::Checkpoint, massif_index)?;
                let mut bc = BlobContext::new(path);
                bc.read_data(self.store.as_ref(), ReadOptions::with_tags())
                    .await?;
                self.cache_mut()?
                    .checkpoints
                    .insert(massif_index, bc.clone());
                bc
            }
        };

        let checkpoint = decoder.decode(&bc.data)?;
        self.cache_mut()?
            .checkpoint_cache
            .insert(massif_index, checkpoint.clone());
        Ok(checkpoint)
    }

    /// Returns a full massif context: body plus decoded start.
    pub async fn get_massif_context(&mut self, massif_index: u32) -> Result<MassifContext> {
        let data = self.get_data(massif_index).await?;
        let start = self.get_start(massif_index).await?;
        Ok(MassifContext {
            start,
            data: data.to_vec(),
            creating: false,
        })
    }

    /// Returns the context of the most recently created massif.
    pub async fn head_context(&mut self) -> Result<MassifContext> {
        let massif_index = self.head_index(ObjectKind::MassifData).await?;
        self.get_massif_context(massif_index).await
    }

    /// Returns the verified context at a massif index: the massif paired
    /// with its checkpoint, signature checked, and the signed peaks compared
    /// against the massif bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpConfigMissing`] without a decoder and verifier,
    /// and a storage error when the signed state does not match the data.
    pub async fn get_context_verified(&mut self, massif_index: u32) -> Result<VerifiedContext> {
        let verifier = self
            .opts
            .checkpoint_verifier
            .clone()
            .ok_or(Error::OpConfigMissing("checkpoint verifier"))?;

        let massif = self.get_massif_context(massif_index).await?;
        let checkpoint = self.get_checkpoint(massif_index).await?;
        verifier.verify(&checkpoint)?;

        let state = checkpoint.state;
        if state.mmr_size > massif.mmr_size() {
            return Err(Error::storage(format!(
                "checkpoint mmr size {} is ahead of massif {} at {}",
                state.mmr_size,
                massif.start.massif_index,
                massif.mmr_size()
            )));
        }

        // V0 states carry a bagged root rather than the peak list; only the
        // signature can be checked for those.
        if !state.peaks.is_empty() {
            let peak_indices = mmr::peaks(state.mmr_size);
            if peak_indices.len() != state.peaks.len() {
                return Err(Error::storage(
                    "checkpoint peak count does not match its mmr size",
                ));
            }
            for (want, index) in state.peaks.iter().zip(peak_indices) {
                let got: [u8; NODE_SIZE] = massif.node_or_ancestor_peak(index)?;
                if got != *want {
                    return Err(Error::storage(format!(
                        "checkpoint peak at mmr index {index} does not match the massif data"
                    )));
                }
            }
        }

        Ok(VerifiedContext { massif, state })
    }

    /// Returns the verified context at the last *sealed* massif. The log may
    /// be ahead of its latest seal, possibly by more than one massif.
    pub async fn head_context_verified(&mut self) -> Result<VerifiedContext> {
        let massif_index = self.head_index(ObjectKind::Checkpoint).await?;
        self.get_context_verified(massif_index).await
    }

    /// The massif index extents known for a kind on the selected log:
    /// `(0, head)`. `None` until a head discovery has run for the kind.
    pub fn extents(&self, kind: ObjectKind) -> Result<Option<(u32, u32)>> {
        let cache = self.cache()?;
        let last = match kind {
            ObjectKind::Checkpoint | ObjectKind::CheckpointsRoot => cache.last_checkpoint_index,
            _ => cache.last_massif_index,
        };
        Ok(last.map(|head| (0, head)))
    }

    /// Returns a snapshot of the cached native context, `None` when the
    /// index has not been seen. No I/O.
    pub fn native(&self, massif_index: u32, kind: ObjectKind) -> Result<Option<BlobContext>> {
        let cache = self.cache()?;
        let map = match kind {
            ObjectKind::Checkpoint | ObjectKind::CheckpointsRoot => &cache.checkpoints,
            _ => &cache.massifs,
        };
        Ok(map.get(&massif_index).cloned())
    }

    /// Seeds or replaces a native context.
    pub fn set_native(
        &mut self,
        massif_index: u32,
        context: BlobContext,
        kind: ObjectKind,
    ) -> Result<()> {
        let cache = self.cache_mut()?;
        match kind {
            ObjectKind::Checkpoint | ObjectKind::CheckpointsRoot => {
                cache.checkpoints.insert(massif_index, context);
            }
            _ => {
                cache.massifs.insert(massif_index, context);
            }
        }
        Ok(())
    }

    /// Writes an object with optimistic concurrency control.
    ///
    /// A cached native context makes this an update guarded by its etag; no
    /// context makes it a create guarded by `if_none_match_any` — if the
    /// caller believed it was updating, it should have read first. On
    /// success the native context is refreshed from the write response.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] when `fail_if_exists` finds a cached
    ///   context, or the create collides in the store.
    /// - [`Error::MissingEtag`] for an update without a cached etag.
    /// - [`Error::PreconditionFailed`] when the etag no longer matches.
    pub async fn put(
        &mut self,
        massif_index: u32,
        kind: ObjectKind,
        data: Bytes,
        fail_if_exists: bool,
    ) -> Result<()> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;
        let existing = self.native(massif_index, kind)?;

        if fail_if_exists {
            if let Some(bc) = &existing {
                return Err(Error::AlreadyExists(bc.path.clone()));
            }
        }

        let (mut bc, opts) = match existing {
            Some(bc) => {
                if bc.etag.is_empty() {
                    return Err(Error::MissingEtag(bc.path));
                }
                let opts = WriteOptions {
                    if_match: Some(bc.etag.clone()),
                    if_none_match_any: false,
                    tags: Some(bc.copy_tags()),
                };
                (bc, opts)
            }
            None => {
                if matches!(kind, ObjectKind::MassifData | ObjectKind::MassifStart) {
                    let height = read_height(&data)?;
                    tracing::debug!(massif_index, height, "creating massif object");
                }
                let path = LogPaths::object_path(&log_id, kind, massif_index)?;
                let opts = WriteOptions {
                    if_match: None,
                    if_none_match_any: true,
                    tags: None,
                };
                (BlobContext::new(path), opts)
            }
        };

        let wr = self.put_object(&bc.path, data.clone(), opts).await?;
        bc.write_update(&wr);
        bc.data = data;
        self.set_native(massif_index, bc, kind)
    }

    /// Raw conditional write through the writer handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OpConfigMissing`] for a store opened without a
    /// writer.
    pub(crate) async fn put_object(
        &self,
        path: &str,
        data: Bytes,
        opts: WriteOptions,
    ) -> Result<WriteResponse> {
        let writer = self
            .opts
            .writer
            .as_ref()
            .ok_or(Error::OpConfigMissing("object writer"))?;
        writer.put(path, data, opts).await
    }

    /// Full-body massif read used by the committer: guarded by the supplied
    /// etag for triage consistency between list and get, tags included. The
    /// native cache entry is replaced with the result.
    pub(crate) async fn read_massif_data(
        &mut self,
        massif_index: u32,
        if_match: Option<String>,
    ) -> Result<BlobContext> {
        let log_id = self.selected.ok_or(Error::LogNotSelected)?;
        let path = match self.cache()?.massifs.get(&massif_index) {
            Some(bc) => bc.path.clone(),
            None => LogPaths::object_path(&log_id, ObjectKind::MassifData, massif_index)?,
        };
        let mut bc = BlobContext::new(path);
        bc.read_data(
            self.store.as_ref(),
            ReadOptions {
                max_bytes: None,
                if_match,
                include_tags: true,
            },
        )
        .await?;
        self.cache_mut()?.massifs.insert(massif_index, bc.clone());
        Ok(bc)
    }

    fn cache(&self) -> Result<&LogCache> {
        self.selected
            .and_then(|id| self.caches.get(&id))
            .ok_or(Error::LogNotSelected)
    }

    fn cache_mut(&mut self) -> Result<&mut LogCache> {
        self.selected
            .and_then(|id| self.caches.get_mut(&id))
            .ok_or(Error::LogNotSelected)
    }
}

impl<S> HasCapability for CachingStore<S> {
    fn has_capability(&self, feature: StoreFeature) -> bool {
        match feature {
            StoreFeature::OptimisticWrite => self.opts.writer.is_some(),
            StoreFeature::TagFilter => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_required() {
        let store = CachingStore::new(
            Arc::new(talus_core::MemoryStore::new()),
            StoreOptions::default(),
        );
        assert!(matches!(
            store.native(0, ObjectKind::MassifData),
            Err(Error::LogNotSelected)
        ));
    }

    #[test]
    fn nil_log_id_is_rejected() {
        let mut store = CachingStore::new(
            Arc::new(talus_core::MemoryStore::new()),
            StoreOptions::default(),
        );
        assert!(store.select_log(LogId::new([0u8; 16])).is_err());
        assert!(store.select_log(LogId::new([1u8; 16])).is_ok());
    }

    #[test]
    fn drop_log_clears_selection() {
        let mut store = CachingStore::new(
            Arc::new(talus_core::MemoryStore::new()),
            StoreOptions::default(),
        );
        let log = LogId::new([1u8; 16]);
        store.select_log(log).unwrap();
        store.drop_log(&log);
        assert_eq!(store.selected_log(), None);
    }

    #[test]
    fn write_capability_tracks_the_writer_handle() {
        let backing = Arc::new(talus_core::MemoryStore::new());
        let read_only = CachingStore::new(backing.clone(), StoreOptions::default());
        assert!(!read_only.has_capability(StoreFeature::OptimisticWrite));

        let writable = CachingStore::new(
            backing.clone(),
            StoreOptions {
                writer: Some(backing),
                ..StoreOptions::default()
            },
        );
        assert!(writable.has_capability(StoreFeature::OptimisticWrite));
    }
}
