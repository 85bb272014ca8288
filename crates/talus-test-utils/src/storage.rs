//! Test storage with operation tracing.
//!
//! Wraps [`MemoryStore`] and records every operation for later assertion.
//! Individual paths can be failed to exercise error handling.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use talus_core::error::{Error, Result};
use talus_core::store::{
    FilterPage, HasCapability, ListOptions, ListPage, ObjectLister, ObjectReader, ObjectWriter,
    ReadOptions, ReadResponse, StoreFeature, TagFilter, WriteOptions, WriteResponse,
};
use talus_core::MemoryStore;

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Read operation.
    Read {
        /// Path that was read.
        path: String,
        /// Truncation limit, when a partial read was requested.
        max_bytes: Option<usize>,
    },
    /// Put operation.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
        /// Etag precondition, when one was supplied.
        if_match: Option<String>,
        /// Whether the write demanded that no object exists.
        if_none_match_any: bool,
    },
    /// List operation.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
    /// Tag filter operation.
    Filter {
        /// The filter expression.
        expr: String,
    },
}

/// In-memory store with operation tracing and failure injection.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryStore {
    inner: MemoryStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_paths: Arc<Mutex<Vec<String>>>,
}

impl TracingMemoryStore {
    /// Creates a new empty tracing store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracing store whose listings page at `page_size` items.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: MemoryStore::with_page_size(page_size),
            ..Self::default()
        }
    }

    /// The operations recorded so far.
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Forgets the recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Makes reads and writes of any path starting with `prefix` fail with
    /// `NotAvailable`.
    pub fn fail_paths_under(&self, prefix: impl Into<String>) {
        self.fail_paths.lock().expect("lock").push(prefix.into());
    }

    /// Number of writes recorded against a path.
    pub fn put_count(&self, path: &str) -> usize {
        self.operations()
            .iter()
            .filter(|op| matches!(op, StoreOp::Put { path: p, .. } if p == path))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        let failing = self.fail_paths.lock().expect("lock");
        if failing.iter().any(|prefix| path.starts_with(prefix)) {
            return Err(Error::NotAvailable { retry_after: None });
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectReader for TracingMemoryStore {
    async fn read(&self, path: &str, opts: ReadOptions) -> Result<ReadResponse> {
        self.record(StoreOp::Read {
            path: path.to_string(),
            max_bytes: opts.max_bytes,
        });
        self.check_failure(path)?;
        self.inner.read(path, opts).await
    }
}

#[async_trait]
impl ObjectWriter for TracingMemoryStore {
    async fn put(&self, path: &str, data: Bytes, opts: WriteOptions) -> Result<WriteResponse> {
        self.record(StoreOp::Put {
            path: path.to_string(),
            size: data.len(),
            if_match: opts.if_match.clone(),
            if_none_match_any: opts.if_none_match_any,
        });
        self.check_failure(path)?;
        self.inner.put(path, data, opts).await
    }
}

#[async_trait]
impl ObjectLister for TracingMemoryStore {
    async fn list(&self, prefix: &str, opts: ListOptions) -> Result<ListPage> {
        self.record(StoreOp::List {
            prefix: prefix.to_string(),
        });
        self.inner.list(prefix, opts).await
    }
}

#[async_trait]
impl TagFilter for TracingMemoryStore {
    async fn filter_by_tag(&self, expr: &str, marker: Option<String>) -> Result<FilterPage> {
        self.record(StoreOp::Filter {
            expr: expr.to_string(),
        });
        self.inner.filter_by_tag(expr, marker).await
    }
}

impl HasCapability for TracingMemoryStore {
    fn has_capability(&self, feature: StoreFeature) -> bool {
        self.inner.has_capability(feature)
    }
}
