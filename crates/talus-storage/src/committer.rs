//! The append-commit engine.
//!
//! [`MassifCommitter`] selects the massif that accepts the next append and
//! commits mutated contexts back to the store under optimistic concurrency
//! control. Three states are observable from the head of a log:
//!
//! ```text
//! no blobs exist            -> create the first massif
//! head massif is full       -> create the next massif
//! head massif has capacity  -> extend the head massif
//! ```
//!
//! The blob is continually rewritten in place while it fills, but on a
//! periodic cadence its root is published somewhere unchangeable. Breaking
//! the append-only rule would therefore be evident; the etag guard and the
//! monotone growth of the node area are the mechanisms that prevent it.

use bytes::Bytes;

use talus_core::error::{Error, Result};
use talus_core::massif::{leaf_span, MassifContext};
use talus_core::paths::{LogPaths, ObjectKind};
use talus_core::store::{HasCapability, ObjectLister, ObjectReader, StoreFeature, WriteOptions};
use talus_core::tags::{get_first_index, set_first_index, TAG_KEY_LAST_ID};
use talus_core::{idtimestamp, mmr, LogId};

use crate::blob::BlobContext;
use crate::store::CachingStore;

/// Options for a [`MassifCommitter`].
#[derive(Debug, Clone, Copy)]
pub struct CommitterOptions {
    /// The log this committer appends to.
    pub log_id: LogId,
    /// Commitment epoch recorded in new massif headers.
    pub commitment_epoch: u32,
    /// Height of massifs created by this committer.
    pub massif_height: u8,
}

/// The append-commit engine for one log.
///
/// At most one writer should commit to a log at a time; when that is
/// violated, the conditional writes guarantee that exactly one of the racing
/// writers succeeds and the others observe an OCC conflict.
pub struct MassifCommitter<S> {
    store: CachingStore<S>,
    opts: CommitterOptions,
}

impl<S> MassifCommitter<S>
where
    S: ObjectReader + ObjectLister + Send + Sync,
{
    /// Creates a committer over a caching store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a nil log id and
    /// [`Error::OpConfigMissing`] when the store has no write capability.
    pub fn new(store: CachingStore<S>, opts: CommitterOptions) -> Result<Self> {
        if opts.log_id.is_nil() {
            return Err(Error::InvalidInput("log id cannot be nil".into()));
        }
        if !store.has_capability(StoreFeature::OptimisticWrite) {
            return Err(Error::OpConfigMissing("object writer"));
        }
        Ok(Self { store, opts })
    }

    /// The caching store backing this committer.
    pub fn store_mut(&mut self) -> &mut CachingStore<S> {
        &mut self.store
    }

    /// Gets the current append context for the log.
    ///
    /// The returned context is ready to accept new entries; `creating` is
    /// true when the commit will create a blob rather than extend one. No
    /// usable context is ever returned alongside an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncorrectFirstIndexTag`] when the head blob's tag
    /// disagrees with its header, and propagates store errors unchanged.
    pub async fn get_current_context(&mut self) -> Result<MassifContext> {
        self.store.select_log(self.opts.log_id)?;

        let head_index = match self.store.head_index(ObjectKind::MassifData).await {
            Err(Error::LogEmpty) => return self.create_first_massif_context(),
            other => other?,
        };

        // The etag from the listing guards the read; it shouldn't matter at
        // this point, but it avoids confusing triage situations, list vs get.
        let listed = self
            .store
            .native(head_index, ObjectKind::MassifData)?
            .ok_or_else(|| Error::internal("head discovery must seed the native context"))?;
        let if_match = (!listed.etag.is_empty()).then(|| listed.etag.clone());
        let bc = self.store.read_massif_data(head_index, if_match).await?;

        // All valid massifs carry at least the fixed versioned header.
        let mc = MassifContext {
            start: talus_core::massif::MassifStart::decode(&bc.data)?,
            data: bc.data.to_vec(),
            creating: false,
        };

        // Tags read directly with the blob are the values last written, and
        // the header was written with them; disagreement means corruption or
        // a partial write and is fatal for this read.
        let tag_first_index = get_first_index(&bc.tags)?;
        if tag_first_index != mc.start.first_index {
            return Err(Error::IncorrectFirstIndexTag {
                tag: tag_first_index,
                header: mc.start.first_index,
            });
        }

        if mc.has_capacity() {
            return Ok(mc);
        }

        // The head is complete; set up to create its successor. The cached
        // context keeps the read tags but forgets the etag and modification
        // time, which belong to the previous blob.
        let next = mc.start_next_massif()?;
        let mut native = BlobContext::new(LogPaths::object_path(
            &self.opts.log_id,
            ObjectKind::MassifData,
            next.start.massif_index,
        )?);
        native.tags = bc.copy_tags();
        set_first_index(&mut native.tags, next.start.first_index);
        self.store
            .set_native(next.start.massif_index, native, ObjectKind::MassifData)?;

        tracing::debug!(
            massif_index = next.start.massif_index,
            first_index = next.start.first_index,
            "starting next massif"
        );
        Ok(next)
    }

    /// Commits a mutated context back to the store.
    ///
    /// # Errors
    ///
    /// - [`Error::MassifFull`] when the context holds more nodes than the
    ///   massif's allocation permits; the blob is untouched.
    /// - [`Error::AlreadyExists`] when a racing writer created the blob
    ///   first; [`Error::PreconditionFailed`] when one updated it first.
    ///   Neither is retried here: drop the context, re-read the head.
    /// - [`Error::MissingEtag`] for a non-creating commit without an etag.
    pub async fn commit_context(&mut self, mc: &MassifContext) -> Result<()> {
        self.store.select_log(self.opts.log_id)?;

        // A massif's last permissible leaf is fixed by its index and height;
        // the spur above that leaf bounds the node count. The store does not
        // guard this, the arithmetic does.
        let height = mc.start.massif_height;
        let max_leaf_index = leaf_span(height) * u64::from(mc.start.massif_index + 1) - 1;
        let max_mmr_size =
            mmr::mmr_index(max_leaf_index) + mmr::spur_height(max_leaf_index) + 1;
        if mc.start.first_index + mc.count() > max_mmr_size {
            return Err(Error::MassifFull {
                first_index: mc.start.first_index,
                count: mc.count(),
                max_mmr_size,
            });
        }

        // The native context is retained by the read that produced the
        // append context; its absence is a programming error, not a race.
        let mut native = self
            .store
            .native(mc.start.massif_index, ObjectKind::MassifData)?
            .ok_or_else(|| Error::internal("commit requires the context retained by the read"))?;

        let epoch = (mc.start.commitment_epoch & 0xff) as u8;
        native.tags.insert(
            TAG_KEY_LAST_ID.to_string(),
            idtimestamp::to_hex(mc.last_id_timestamp(), epoch),
        );

        // The etag guards against racy updates; it is absent only when
        // creating. Creating writes additionally demand that no blob exists
        // at the path, spelled as if-none-match any.
        let if_match = (!native.etag.is_empty()).then(|| native.etag.clone());
        if if_match.is_none() && !mc.creating {
            return Err(Error::MissingEtag(native.path));
        }
        let opts = WriteOptions {
            if_match,
            if_none_match_any: mc.creating,
            tags: Some(native.copy_tags()),
        };

        let data = Bytes::from(mc.data.clone());
        let wr = self.store.put_object(&native.path, data.clone(), opts).await?;

        native.write_update(&wr);
        native.data = data;
        self.store
            .set_native(mc.start.massif_index, native, ObjectKind::MassifData)?;

        tracing::debug!(
            massif_index = mc.start.massif_index,
            count = mc.count(),
            creating = mc.creating,
            "committed massif context"
        );
        Ok(())
    }

    fn create_first_massif_context(&mut self) -> Result<MassifContext> {
        let mc = MassifContext::new_first(self.opts.commitment_epoch, self.opts.massif_height);

        let mut native = BlobContext::new(LogPaths::object_path(
            &self.opts.log_id,
            ObjectKind::MassifData,
            0,
        )?);
        // first index zero is correct for the first massif
        set_first_index(&mut native.tags, mc.start.first_index);
        self.store.set_native(0, native, ObjectKind::MassifData)?;

        Ok(mc)
    }
}
