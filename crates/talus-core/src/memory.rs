//! In-memory object store.
//!
//! Implements all four storage capabilities with cloud-like semantics:
//! generation-counter etags, conditional writes, lexically ordered paged
//! listings and a synchronously maintained tag index. Suitable for tests and
//! local runs; not for production.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::store::{
    FilterPage, FilteredItem, HasCapability, ListItem, ListOptions, ListPage, ObjectLister,
    ObjectReader, ObjectWriter, ReadOptions, ReadResponse, StoreFeature, TagFilter, WriteOptions,
    WriteResponse,
};
use crate::tags::TagMap;

const DEFAULT_PAGE_SIZE: usize = 5000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    // Generation counter exposed as a quoted etag string.
    version: i64,
    last_modified: DateTime<Utc>,
    tags: TagMap,
}

impl StoredObject {
    fn etag(&self) -> String {
        format!("\"{}\"", self.version)
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<String, StoredObject>>>,
    page_size: Option<usize>,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose listings and filter results page at `page_size`
    /// items, for exercising pagination in tests.
    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Arc::default(),
            page_size: Some(page_size.max(1)),
        }
    }

    fn page_size(&self, requested: Option<u32>) -> usize {
        requested
            .map(|n| n as usize)
            .or(self.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .max(1)
    }

    fn guard(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects.read().map_err(|_| Error::internal("lock poisoned"))
    }

    fn guard_mut(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects.write().map_err(|_| Error::internal("lock poisoned"))
    }
}

#[async_trait]
impl ObjectReader for MemoryStore {
    async fn read(&self, path: &str, opts: ReadOptions) -> Result<ReadResponse> {
        let objects = self.guard()?;
        let obj = objects
            .get(path)
            .ok_or_else(|| Error::DoesNotExist(path.to_string()))?;

        if let Some(expected) = &opts.if_match {
            if *expected != obj.etag() {
                return Err(Error::PreconditionFailed {
                    path: path.to_string(),
                });
            }
        }

        let data = match opts.max_bytes {
            Some(n) if n < obj.data.len() => obj.data.slice(..n),
            _ => obj.data.clone(),
        };

        Ok(ReadResponse {
            data,
            etag: obj.etag(),
            last_modified: obj.last_modified,
            content_length: obj.data.len() as u64,
            tags: opts.include_tags.then(|| obj.tags.clone()),
        })
    }
}

#[async_trait]
impl ObjectWriter for MemoryStore {
    async fn put(&self, path: &str, data: Bytes, opts: WriteOptions) -> Result<WriteResponse> {
        let mut objects = self.guard_mut()?;
        let current = objects.get(path);

        if opts.if_none_match_any && current.is_some() {
            return Err(Error::AlreadyExists(path.to_string()));
        }
        if let Some(expected) = &opts.if_match {
            match current {
                Some(obj) if *expected == obj.etag() => {}
                _ => {
                    return Err(Error::PreconditionFailed {
                        path: path.to_string(),
                    })
                }
            }
        }

        let version = current.map_or(1, |o| o.version + 1);
        let size = data.len() as u64;
        let stored = StoredObject {
            data,
            version,
            last_modified: Utc::now(),
            tags: opts.tags.unwrap_or_default(),
        };
        let response = WriteResponse {
            etag: stored.etag(),
            last_modified: stored.last_modified,
            size,
        };
        objects.insert(path.to_string(), stored);
        Ok(response)
    }
}

#[async_trait]
impl ObjectLister for MemoryStore {
    async fn list(&self, prefix: &str, opts: ListOptions) -> Result<ListPage> {
        let page_size = self.page_size(opts.page_size);
        let objects = self.guard()?;

        let mut items = Vec::new();
        let mut marker = None;
        for (path, obj) in objects.range(prefix.to_string()..) {
            if !path.starts_with(prefix) {
                break;
            }
            if let Some(after) = &opts.marker {
                if path.as_str() <= after.as_str() {
                    continue;
                }
            }
            if items.len() == page_size {
                // one more item exists, so the previous page is not final
                marker = items.last().map(|it: &ListItem| it.path.clone());
                break;
            }
            items.push(ListItem {
                path: path.clone(),
                etag: obj.etag(),
                last_modified: obj.last_modified,
                content_length: obj.data.len() as u64,
                tags: Some(obj.tags.clone()),
            });
        }

        Ok(ListPage { items, marker })
    }
}

#[async_trait]
impl TagFilter for MemoryStore {
    async fn filter_by_tag(&self, expr: &str, marker: Option<String>) -> Result<FilterPage> {
        let (key, floor) = parse_tag_filter(expr)?;
        let page_size = self.page_size(None);
        let objects = self.guard()?;

        let mut items = Vec::new();
        let mut next_marker = None;
        for (path, obj) in objects.iter() {
            if let Some(after) = &marker {
                if path.as_str() <= after.as_str() {
                    continue;
                }
            }
            let Some(value) = obj.tags.get(&key) else {
                continue;
            };
            if value.as_str() < floor.as_str() {
                continue;
            }
            if items.len() == page_size {
                next_marker = items.last().map(|it: &FilteredItem| it.path.clone());
                break;
            }
            items.push(FilteredItem {
                path: path.clone(),
                tags: obj.tags.clone(),
            });
        }

        Ok(FilterPage {
            items,
            marker: next_marker,
        })
    }
}

impl HasCapability for MemoryStore {
    fn has_capability(&self, feature: StoreFeature) -> bool {
        matches!(
            feature,
            StoreFeature::OptimisticWrite | StoreFeature::TagFilter
        )
    }
}

// Parses the one filter form the engine emits: "key">='value'
fn parse_tag_filter(expr: &str) -> Result<(String, String)> {
    let invalid = || Error::InvalidInput(format!("unsupported tag filter expression: {expr}"));
    let rest = expr.strip_prefix('"').ok_or_else(invalid)?;
    let (key, rest) = rest.split_once('"').ok_or_else(invalid)?;
    let rest = rest.strip_prefix(">=").ok_or_else(invalid)?;
    let value = rest
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .ok_or_else(invalid)?;
    if key.is_empty() {
        return Err(invalid());
    }
    Ok((key.to_string(), value.to_string()))
}
