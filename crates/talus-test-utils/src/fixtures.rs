//! Pre-wired test environments.

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use talus_core::checkpoint::{MmrState, MMR_STATE_VERSION_1};
use talus_core::error::Result;
use talus_core::idtimestamp::TIME_SHIFT;
use talus_core::massif::MassifContext;
use talus_core::paths::{LogPaths, ObjectKind};
use talus_core::store::{ObjectWriter, WriteOptions};
use talus_core::tags::{self, TagMap};
use talus_core::{mmr, LogId};
use talus_storage::{CachingStore, CommitterOptions, MassifCommitter, StorageOptions, StoreOptions};

use crate::checkpoints::TestCheckpointCodec;
use crate::leaves::{append_leaf, leaf_value};
use crate::storage::TracingMemoryStore;

// Fake clock origin; ids only need to be monotonic and decodable.
const TEST_EPOCH_MS: u64 = 1_700_000_000_000;

/// A store, a log and a fake id clock, wired for committer and watcher
/// tests.
#[derive(Debug)]
pub struct TestContext {
    /// The shared backing store.
    pub store: Arc<TracingMemoryStore>,
    /// The log under test.
    pub log_id: LogId,
    /// Commitment epoch for new massifs.
    pub commitment_epoch: u32,
    /// Massif height for new massifs.
    pub massif_height: u8,
    next_ms: u64,
}

impl TestContext {
    /// A context over a fresh store with the customary small test height.
    pub fn new() -> Self {
        Self::with_height(3)
    }

    /// A context whose committers build massifs of the given height.
    pub fn with_height(massif_height: u8) -> Self {
        Self::over(Arc::new(TracingMemoryStore::new()), massif_height)
    }

    /// A context over an existing store, for multi-writer scenarios.
    pub fn over(store: Arc<TracingMemoryStore>, massif_height: u8) -> Self {
        Self {
            store,
            log_id: LogId::from_uuid(Uuid::new_v4()),
            commitment_epoch: 1,
            massif_height,
            next_ms: TEST_EPOCH_MS,
        }
    }

    /// A caching store over the shared backing store, with the test
    /// checkpoint codec wired in.
    pub fn caching_store(&self) -> CachingStore<TracingMemoryStore> {
        let codec = Arc::new(TestCheckpointCodec::new());
        CachingStore::new(
            self.store.clone(),
            StoreOptions {
                storage: StorageOptions {
                    commitment_epoch: self.commitment_epoch,
                    massif_height: self.massif_height,
                },
                writer: Some(self.store.clone()),
                checkpoint_decoder: Some(codec.clone()),
                checkpoint_verifier: Some(codec),
            },
        )
    }

    /// A committer for the context's log.
    pub fn committer(&self) -> MassifCommitter<TracingMemoryStore> {
        MassifCommitter::new(
            self.caching_store(),
            CommitterOptions {
                log_id: self.log_id,
                commitment_epoch: self.commitment_epoch,
                massif_height: self.massif_height,
            },
        )
        .expect("test committer")
    }

    /// The next monotonic id timestamp from the fake clock.
    pub fn next_id(&mut self) -> u64 {
        self.next_ms += 1;
        self.next_ms << TIME_SHIFT
    }

    /// Appends `n` leaves through the committer, one commit per leaf so the
    /// massif boundaries are crossed the way production appenders cross
    /// them.
    pub async fn commit_leaves(
        &mut self,
        committer: &mut MassifCommitter<TracingMemoryStore>,
        n: u64,
    ) -> Result<()> {
        for _ in 0..n {
            let mut mc = committer.get_current_context().await?;
            let leaf_number = mmr::leaf_count(mc.mmr_size());
            let id = self.next_id();
            append_leaf(&mut mc, &leaf_value("leaf", leaf_number), id)?;
            committer.commit_context(&mc).await?;
        }
        Ok(())
    }

    /// Writes a checkpoint blob for the given massif context, tagged the way
    /// the sealing service tags them.
    pub async fn seal(&self, mc: &MassifContext) -> Result<()> {
        let mmr_size = mc.mmr_size();
        let peaks = mmr::peaks(mmr_size)
            .into_iter()
            .map(|p| mc.node_or_ancestor_peak(p))
            .collect::<Result<Vec<_>>>()?;

        let state = MmrState {
            version: MMR_STATE_VERSION_1,
            mmr_size,
            peaks,
            legacy_root: None,
            timestamp_ms: i64::try_from(self.next_ms).unwrap_or(i64::MAX),
            commitment_epoch: self.commitment_epoch,
            id_timestamp: mc.last_id_timestamp(),
        };
        let blob = TestCheckpointCodec::new().encode(&state)?;

        let mut seal_tags = TagMap::new();
        seal_tags.insert(
            tags::TAG_KEY_LAST_ID.to_string(),
            talus_core::idtimestamp::to_hex(
                mc.last_id_timestamp(),
                (self.commitment_epoch & 0xff) as u8,
            ),
        );
        let path =
            LogPaths::object_path(&self.log_id, ObjectKind::Checkpoint, mc.start.massif_index)?;
        self.store
            .put(
                &path,
                Bytes::from(blob),
                WriteOptions {
                    if_none_match_any: true,
                    tags: Some(seal_tags),
                    ..WriteOptions::default()
                },
            )
            .await?;
        Ok(())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
