//! Checkpoints (signed tree heads).
//!
//! A checkpoint commits to the MMR state at a specific massif index. On the
//! wire it is a COSE_Sign1 envelope over a CBOR payload; the envelope codec
//! and the signature verifier are external collaborators supplied at store
//! construction through the traits below. A store without a decoder fails
//! checkpoint reads with `OpConfigMissing`.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Payload version for legacy single-root states. Decode-only: new
/// checkpoints are never written at this version.
pub const MMR_STATE_VERSION_0: u16 = 0;

/// Current payload version carrying the full ordered peak list.
pub const MMR_STATE_VERSION_1: u16 = 1;

/// The MMR state a checkpoint commits to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MmrState {
    /// Payload version.
    pub version: u16,
    /// MMR size (node count) at signing.
    pub mmr_size: u64,
    /// Ordered peak hashes, highest peak first. Empty for version 0 states.
    pub peaks: Vec<[u8; 32]>,
    /// The single bagged root of a version 0 state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_root: Option<[u8; 32]>,
    /// Wall clock milliseconds at signing.
    pub timestamp_ms: i64,
    /// Commitment epoch of the log.
    pub commitment_epoch: u32,
    /// Id timestamp of the most recent entry covered by this state.
    pub id_timestamp: u64,
}

/// A decoded checkpoint: the state plus the envelope pieces needed to
/// re-verify the signature later.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// The decoded MMR state payload.
    pub state: MmrState,
    /// Raw protected header bytes of the envelope.
    pub protected: Bytes,
    /// Raw signature bytes.
    pub signature: Bytes,
}

/// Decodes checkpoint envelopes.
pub trait CheckpointDecoder: Send + Sync {
    /// Decodes a stored checkpoint blob.
    ///
    /// Version 0 payloads must decode (legacy logs are still read); encoders
    /// must refuse to produce them.
    fn decode(&self, data: &[u8]) -> Result<Checkpoint>;
}

/// Verifies checkpoint signatures.
pub trait CheckpointVerifier: Send + Sync {
    /// Verifies the envelope signature over the checkpoint's state.
    fn verify(&self, checkpoint: &Checkpoint) -> Result<()>;
}
