//! Test checkpoint codec.
//!
//! A deterministic stand-in for the production COSE_Sign1 codec and
//! verifier: the payload is JSON, the signature a keyed digest. Encoding a
//! version 0 state is refused, matching the production contract that legacy
//! states are decode-only.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use talus_core::checkpoint::{
    Checkpoint, CheckpointDecoder, CheckpointVerifier, MmrState, MMR_STATE_VERSION_0,
};
use talus_core::error::{Error, Result};

const TEST_KEY: &[u8] = b"talus-test-checkpoint-key";

#[derive(Serialize, Deserialize)]
struct TestEnvelope {
    protected: Vec<u8>,
    payload: MmrState,
    signature: Vec<u8>,
}

/// Envelope codec and verifier for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestCheckpointCodec;

impl TestCheckpointCodec {
    /// Creates the codec.
    pub fn new() -> Self {
        Self
    }

    /// Encodes and "signs" a state into an envelope blob.
    ///
    /// Refuses version 0 states; they exist only to be read from legacy
    /// logs.
    pub fn encode(&self, state: &MmrState) -> Result<Vec<u8>> {
        if state.version == MMR_STATE_VERSION_0 {
            return Err(Error::InvalidInput(
                "refusing to write a version 0 checkpoint".into(),
            ));
        }
        let envelope = TestEnvelope {
            protected: TEST_KEY.to_vec(),
            signature: sign(state),
            payload: state.clone(),
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| Error::InvalidInput(format!("unencodable state: {e}")))
    }
}

impl CheckpointDecoder for TestCheckpointCodec {
    fn decode(&self, data: &[u8]) -> Result<Checkpoint> {
        let envelope: TestEnvelope = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidInput(format!("undecodable checkpoint: {e}")))?;
        Ok(Checkpoint {
            state: envelope.payload,
            protected: Bytes::from(envelope.protected),
            signature: Bytes::from(envelope.signature),
        })
    }
}

impl CheckpointVerifier for TestCheckpointCodec {
    fn verify(&self, checkpoint: &Checkpoint) -> Result<()> {
        if sign(&checkpoint.state) != checkpoint.signature.as_ref() {
            return Err(Error::storage("checkpoint signature does not verify"));
        }
        Ok(())
    }
}

fn sign(state: &MmrState) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(TEST_KEY);
    hasher.update(serde_json::to_vec(state).expect("states serialize"));
    hasher.finalize().to_vec()
}
