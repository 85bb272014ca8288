//! Error types and result aliases for talus.
//!
//! Store drivers translate native status codes to this taxonomy exactly once,
//! at the adapter boundary. No other layer inspects raw status codes.

use std::time::Duration;

/// The result type used throughout talus.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in talus operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No objects exist for the requested (log, kind) prefix.
    #[error("the log has no objects of the requested kind")]
    LogEmpty,

    /// An operation that requires a selected log was called without one.
    #[error("no log is selected")]
    LogNotSelected,

    /// The store reported not-found for a specific object.
    #[error("not found: {0}")]
    DoesNotExist(String),

    /// An optimistic create collided with an existing object.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A conditional write or read failed its etag precondition.
    #[error("precondition failed: {path}")]
    PreconditionFailed {
        /// The object path whose etag no longer matched.
        path: String,
    },

    /// Permission denied, throttling, or service unavailable.
    ///
    /// When the store supplied a retry-after hint it is carried here; callers
    /// apply their own default backoff when it is absent.
    #[error("store not available (denied, throttled or unreachable)")]
    NotAvailable {
        /// Server-hinted wait before retrying, when one was supplied.
        retry_after: Option<Duration>,
    },

    /// A required blob tag is missing.
    #[error("the required tag '{0}' is missing")]
    MissingTag(&'static str),

    /// The `firstindex` tag disagrees with the massif header.
    ///
    /// A mismatch signals corruption or a partial write and is fatal for the
    /// read; it is never silently repaired.
    #[error("firstindex tag {tag:x} does not match the header value {header:x}")]
    IncorrectFirstIndexTag {
        /// First index recovered from the blob tag.
        tag: u64,
        /// First index recorded in the massif start header.
        header: u64,
    },

    /// A tag value expected to be 64 bit hex had more than 8 bytes of data.
    #[error("64 bit hex tag value overflows: {0}")]
    Hex64Overflow(String),

    /// A storage path does not parse under the path schema.
    #[error("storage path does not parse: {0}")]
    InvalidPath(String),

    /// A commit would exceed the massif's allocated capacity.
    #[error(
        "massif full: first index {first_index} + count {count} exceeds max mmr size {max_mmr_size}"
    )]
    MassifFull {
        /// First MMR index stored by the massif.
        first_index: u64,
        /// Number of nodes the rejected context holds.
        count: u64,
        /// Largest MMR size the massif may reach.
        max_mmr_size: u64,
    },

    /// A non-creating write was attempted without a cached etag.
    #[error("an etag is required when updating an existing object: {0}")]
    MissingEtag(String),

    /// An operation needs configuration that was not provided at open time.
    #[error("operation requires configuration that was not provided: {0}")]
    OpConfigMissing(&'static str),

    /// Terminal watcher state: nothing matched within the watch count.
    #[error("no changes found")]
    NoChanges,

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An internal error that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for the optimistic concurrency conflicts.
    ///
    /// The remediation for either is the same: drop the stale context and
    /// re-read the head.
    #[must_use]
    pub fn is_occ_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists(_) | Self::PreconditionFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occ_conflicts_are_recognised() {
        assert!(Error::AlreadyExists("p".into()).is_occ_conflict());
        assert!(Error::PreconditionFailed { path: "p".into() }.is_occ_conflict());
        assert!(!Error::LogEmpty.is_occ_conflict());
        assert!(!Error::DoesNotExist("p".into()).is_occ_conflict());
    }

    #[test]
    fn storage_error_carries_source() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = Error::storage_with_source("read failed", source);
        assert!(std::error::Error::source(&err).is_some());
    }
}
