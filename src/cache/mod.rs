//! Response cache port.
//!
//! # Data Flow
//! ```text
//! gateway probe  → CacheStore::fetch(path, request meta) → body | none
//! gateway tee    → CacheStore::put(path, body, response meta) (async, after response end)
//! ```
//!
//! # Design Decisions
//! - Keyed by request path only; no TTL or eviction in the gateway
//! - Admission policy (which responses to keep) lives in the store
//! - Concurrent puts for one path: last write wins

pub mod fs;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{request, HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use thiserror::Error;

use crate::config::{CacheBackend, CacheConfig};

pub use fs::FsCache;
pub use memory::MemoryCache;

/// Errors reported by cache backends. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Request metadata passed to `fetch`.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestMeta {
    pub fn from_parts(parts: &request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }
}

/// Response metadata passed to `put`.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// A path-keyed response store.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Look up a stored body. `Ok(None)` is a miss.
    async fn fetch(&self, path: &str, request: &RequestMeta) -> Result<Option<Bytes>, CacheError>;

    /// Store a rendered body.
    async fn put(&self, path: &str, body: Bytes, response: &ResponseMeta) -> Result<(), CacheError>;
}

/// Build the configured backend, if any.
pub fn from_config(config: &CacheConfig) -> Result<Option<Arc<dyn CacheStore>>, CacheError> {
    match config.backend {
        CacheBackend::None => Ok(None),
        CacheBackend::Memory => Ok(Some(Arc::new(MemoryCache::new()))),
        CacheBackend::Fs => {
            let dir = config
                .dir
                .clone()
                .ok_or_else(|| CacheError::Unavailable("cache.dir is not set".to_string()))?;
            Ok(Some(Arc::new(FsCache::open(dir)?)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        assert!(from_config(&CacheConfig::default()).unwrap().is_none());

        let memory = CacheConfig {
            backend: CacheBackend::Memory,
            dir: None,
        };
        assert!(from_config(&memory).unwrap().is_some());

        let fs_missing_dir = CacheConfig {
            backend: CacheBackend::Fs,
            dir: None,
        };
        assert!(matches!(
            from_config(&fs_missing_dir),
            Err(CacheError::Unavailable(_))
        ));
    }
}
