//! Shared test utilities for talus integration tests.
//!
//! This crate provides:
//! - [`TracingMemoryStore`]: in-memory storage with operation recording
//! - [`TestContext`]: a pre-wired store + committer environment
//! - Leaf generation helpers that build real MMR structure with hashing
//! - A checkpoint codec/signer for exercising the decoder seam

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are
// acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]

pub mod checkpoints;
pub mod fixtures;
pub mod leaves;
pub mod storage;

pub use checkpoints::TestCheckpointCodec;
pub use fixtures::TestContext;
pub use leaves::{append_leaf, leaf_value};
pub use storage::{StoreOp, TracingMemoryStore};

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("talus=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
