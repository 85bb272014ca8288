//! Object store port.
//!
//! The engine consumes object storage through four orthogonal capability
//! traits. Concrete stores implement the ones they support and report the
//! optional ones through [`HasCapability`]; a read-only deployment simply
//! never offers [`StoreFeature::OptimisticWrite`].
//!
//! The adapter behind these traits is the only code that speaks the native
//! protocol: it translates native status codes to the [`crate::error::Error`]
//! taxonomy exactly once, and it is responsible for fully consuming and
//! releasing native response bodies even on error.
//!
//! # Conditional writes
//!
//! The engine's at-most-one-writer guarantee rests on two write
//! preconditions:
//!
//! - `if_none_match_any` must fail with [`crate::error::Error::AlreadyExists`]
//!   when any object is present at the path.
//! - `if_match` must fail with [`crate::error::Error::PreconditionFailed`]
//!   when the object's etag no longer matches.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::tags::TagMap;

/// Options for a single read.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Read exactly the first N bytes instead of the whole object. The
    /// response's `content_length` still reports the full object size.
    pub max_bytes: Option<usize>,
    /// Fail with `PreconditionFailed` unless the object's etag matches.
    pub if_match: Option<String>,
    /// Also fetch the object's tags. Tags read with the object are
    /// authoritative, unlike the eventually consistent tag index.
    pub include_tags: bool,
}

impl ReadOptions {
    /// Options for a whole-object read including tags.
    #[must_use]
    pub fn with_tags() -> Self {
        Self {
            include_tags: true,
            ..Self::default()
        }
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Fail with `PreconditionFailed` unless the object's etag matches.
    pub if_match: Option<String>,
    /// Fail with `AlreadyExists` when any object is present at the path.
    pub if_none_match_any: bool,
    /// Replace the object's tag set. `None` writes an empty tag set.
    pub tags: Option<TagMap>,
}

/// Options for a single list page.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Resume after a previous page's marker.
    pub marker: Option<String>,
    /// Maximum items per page; the store's default applies when absent.
    pub page_size: Option<u32>,
}

/// A successful read.
#[derive(Debug, Clone)]
pub struct ReadResponse {
    /// The object bytes; truncated to `max_bytes` when that was requested.
    pub data: Bytes,
    /// The object's current etag.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Full object size in bytes, regardless of truncation.
    pub content_length: u64,
    /// Tags, when `include_tags` was requested.
    pub tags: Option<TagMap>,
}

/// A successful write.
#[derive(Debug, Clone)]
pub struct WriteResponse {
    /// The etag produced by the write.
    pub etag: String,
    /// Last modification time recorded by the store.
    pub last_modified: DateTime<Utc>,
    /// Number of bytes written.
    pub size: u64,
}

/// One item of a list page.
#[derive(Debug, Clone)]
pub struct ListItem {
    /// Object path.
    pub path: String,
    /// Current etag.
    pub etag: String,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Object size in bytes.
    pub content_length: u64,
    /// Tags, when the store includes them in listings.
    pub tags: Option<TagMap>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Items in lexical path order.
    pub items: Vec<ListItem>,
    /// Marker for the next page; absent on the final page.
    pub marker: Option<String>,
}

/// One item of a tag-filtered listing.
#[derive(Debug, Clone)]
pub struct FilteredItem {
    /// Object path.
    pub path: String,
    /// The object's tags as indexed by the store.
    pub tags: TagMap,
}

/// One page of a tag-filtered listing.
#[derive(Debug, Clone, Default)]
pub struct FilterPage {
    /// Matching items.
    pub items: Vec<FilteredItem>,
    /// Marker for the next page; absent on the final page.
    pub marker: Option<String>,
}

/// Optional store capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreFeature {
    /// Conditional writes (etag / if-none-match preconditions).
    OptimisticWrite,
    /// Server-side tag filtering.
    TagFilter,
}

impl fmt::Display for StoreFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OptimisticWrite => write!(f, "optimistic-write"),
            Self::TagFilter => write!(f, "tag-filter"),
        }
    }
}

/// Read access to objects.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Reads an object, optionally truncated to the first `max_bytes` bytes.
    ///
    /// A truncated read consumes exactly the requested prefix of the object;
    /// the remainder of the stream is released, not drained.
    async fn read(&self, path: &str, opts: ReadOptions) -> Result<ReadResponse>;
}

/// Conditional write access to objects.
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Writes an object under the preconditions in `opts`.
    async fn put(&self, path: &str, data: Bytes, opts: WriteOptions) -> Result<WriteResponse>;
}

/// Prefix listing access.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Lists one page of objects under `prefix` in lexical order.
    async fn list(&self, prefix: &str, opts: ListOptions) -> Result<ListPage>;
}

/// Server-side tag filtering.
///
/// The tag index is eventually consistent; it is used for discovery only,
/// never for correctness.
#[async_trait]
pub trait TagFilter: Send + Sync {
    /// Lists one page of objects matching a tag filter expression of the
    /// form `"key">='value'`.
    async fn filter_by_tag(&self, expr: &str, marker: Option<String>) -> Result<FilterPage>;
}

/// Capability presence query, used to guard optional operations.
pub trait HasCapability {
    /// True when the store supports `feature`.
    fn has_capability(&self, feature: StoreFeature) -> bool;
}

/// Renders the standard activity filter expression for a `lastid` floor.
#[must_use]
pub fn last_id_filter(floor_hex: &str) -> String {
    format!("\"{}\">='{floor_hex}'", crate::tags::TAG_KEY_LAST_ID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_id_filter_shape() {
        assert_eq!(
            last_id_filter("010000000000000000"),
            "\"lastid\">='010000000000000000'"
        );
    }

    #[test]
    fn read_options_with_tags() {
        let opts = ReadOptions::with_tags();
        assert!(opts.include_tags);
        assert!(opts.max_bytes.is_none());
        assert!(opts.if_match.is_none());
    }
}
