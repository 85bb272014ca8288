//! Blob contexts and head discovery.
//!
//! A log is a series of numbered blobs, one per massif, with each kind kept
//! under its own prefix because listing is the only way to find the head.
//! [`BlobContext`] is the per-blob record of everything the store told us on
//! the last read or write: path, etag, last-modified, tags, length and
//! (possibly truncated) body.

use std::collections::VecDeque;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use talus_core::error::Result;
use talus_core::massif::START_HEADER_END;
use talus_core::store::{
    ListItem, ListOptions, ObjectLister, ObjectReader, ReadOptions, WriteResponse,
};
use talus_core::tags::TagMap;
use talus_core::Error;

/// Per-blob metadata and cached body, captured from the store on any read or
/// write.
#[derive(Debug, Clone, Default)]
pub struct BlobContext {
    /// Storage path of the blob.
    pub path: String,
    /// Etag observed on the most recent read or write; empty when unknown.
    pub etag: String,
    /// Tags observed with the blob. Tags read directly with a blob are
    /// authoritative; tags from the filter index are not.
    pub tags: TagMap,
    /// Last modification time reported by the store.
    pub last_modified: Option<DateTime<Utc>>,
    /// When this context last round-tripped to the store.
    pub last_read: Option<DateTime<Utc>>,
    /// Cached body; may be truncated to the start header.
    pub data: Bytes,
    /// Full blob size in bytes, regardless of how much body is cached.
    pub content_length: u64,
}

impl BlobContext {
    /// Creates an empty context for a path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Seeds a context from a listing entry. No body is available; tags are
    /// taken when the listing carried them.
    #[must_use]
    pub fn from_list_item(item: &ListItem) -> Self {
        Self {
            path: item.path.clone(),
            etag: item.etag.clone(),
            tags: item.tags.clone().unwrap_or_default(),
            last_modified: Some(item.last_modified),
            last_read: None,
            data: Bytes::new(),
            content_length: item.content_length,
        }
    }

    /// True when the cached body is the complete blob.
    #[must_use]
    pub fn has_full_data(&self) -> bool {
        !self.data.is_empty() && self.data.len() as u64 == self.content_length
    }

    /// True when at least the start header is cached.
    #[must_use]
    pub fn has_start_data(&self) -> bool {
        self.data.len() >= START_HEADER_END
    }

    /// Reads the blob body, populating the metadata fields from the
    /// response.
    pub async fn read_data<R: ObjectReader + ?Sized>(
        &mut self,
        store: &R,
        opts: ReadOptions,
    ) -> Result<()> {
        let rr = store.read(&self.path, opts).await?;
        self.data = rr.data;
        self.etag = rr.etag;
        self.last_modified = Some(rr.last_modified);
        self.content_length = rr.content_length;
        if let Some(tags) = rr.tags {
            self.tags = tags;
        }
        self.last_read = Some(Utc::now());
        Ok(())
    }

    /// Reads just the start header of the blob.
    pub async fn read_start<R: ObjectReader + ?Sized>(&mut self, store: &R) -> Result<()> {
        self.read_data(
            store,
            ReadOptions {
                max_bytes: Some(START_HEADER_END),
                include_tags: true,
                if_match: None,
            },
        )
        .await
    }

    /// Refreshes the context from a write response.
    pub fn write_update(&mut self, wr: &WriteResponse) {
        self.etag = wr.etag.clone();
        self.last_modified = Some(wr.last_modified);
        self.content_length = wr.size;
        self.last_read = Some(Utc::now());
    }

    /// Returns an owned copy of the tag map.
    #[must_use]
    pub fn copy_tags(&self) -> TagMap {
        self.tags.clone()
    }
}

/// Finds the last blob under a prefix, paging the listing to exhaustion.
///
/// Returns the context seeded from the final item and the total number of
/// blobs under the prefix; `(None, 0)` when the prefix is empty. Listing is
/// lexical and basenames are fixed width, so the final item is the head.
pub async fn last_prefixed_blob<S: ObjectLister + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<(Option<BlobContext>, u64)> {
    let mut last: Option<ListItem> = None;
    let mut count: u64 = 0;
    let mut marker: Option<String> = None;

    loop {
        let page = store
            .list(
                prefix,
                ListOptions {
                    marker: marker.take(),
                    page_size: None,
                },
            )
            .await?;
        if page.items.is_empty() {
            break;
        }
        count += page.items.len() as u64;
        last = page.items.into_iter().last();
        marker = page.marker;
        if marker.is_none() {
            break;
        }
    }

    Ok((last.as_ref().map(BlobContext::from_list_item), count))
}

/// Finds the first blob under a prefix.
///
/// # Errors
///
/// Returns [`Error::DoesNotExist`] when the prefix is empty.
pub async fn first_prefixed_blob<S: ObjectLister + ?Sized>(
    store: &S,
    prefix: &str,
) -> Result<BlobContext> {
    let page = store
        .list(
            prefix,
            ListOptions {
                marker: None,
                page_size: Some(1),
            },
        )
        .await?;
    page.items
        .first()
        .map(BlobContext::from_list_item)
        .ok_or_else(|| Error::DoesNotExist(prefix.to_string()))
}

/// Returns contexts for the last `n` blobs under a prefix, oldest first,
/// and the total number of blobs seen.
///
/// The returned tail always holds exactly `min(count, n)` items.
pub async fn prefixed_blob_tail<S: ObjectLister + ?Sized>(
    store: &S,
    prefix: &str,
    n: usize,
) -> Result<(Vec<BlobContext>, u64)> {
    let mut tail: VecDeque<ListItem> = VecDeque::with_capacity(n + 1);
    let mut count: u64 = 0;
    let mut marker: Option<String> = None;

    if n == 0 {
        return Ok((Vec::new(), 0));
    }

    loop {
        let page = store
            .list(
                prefix,
                ListOptions {
                    marker: marker.take(),
                    page_size: None,
                },
            )
            .await?;
        if page.items.is_empty() {
            break;
        }
        count += page.items.len() as u64;
        for item in page.items {
            if tail.len() == n {
                tail.pop_front();
            }
            tail.push_back(item);
        }
        marker = page.marker;
        if marker.is_none() {
            break;
        }
    }

    let contexts = tail.iter().map(BlobContext::from_list_item).collect();
    Ok((contexts, count))
}
