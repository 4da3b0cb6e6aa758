//! In-process response cache.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::cache::{CacheError, CacheStore, RequestMeta, ResponseMeta};

/// A thread-safe path → body map, private to one worker.
///
/// Only successful (2xx) responses are admitted.
#[derive(Clone, Default)]
pub struct MemoryCache {
    inner: Arc<DashMap<String, Bytes>>,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored paths.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Read a body without going through the port.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.inner.get(path).map(|r| r.value().clone())
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn fetch(&self, path: &str, _request: &RequestMeta) -> Result<Option<Bytes>, CacheError> {
        Ok(self.get(path))
    }

    async fn put(&self, path: &str, body: Bytes, response: &ResponseMeta) -> Result<(), CacheError> {
        if !response.status.is_success() {
            tracing::debug!(path, status = %response.status, "Not caching non-success response");
            return Ok(());
        }
        self.inner.insert(path.to_string(), body);
        Ok(())
    }
}
