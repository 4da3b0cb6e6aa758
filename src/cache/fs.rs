//! Directory-backed response cache shared by every worker on a host.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::cache::{CacheError, CacheStore, RequestMeta, ResponseMeta};

/// Stores each body in `<dir>/<sha256(path)>.html`.
///
/// Every write gets its own temp file in `dir` and is renamed into place,
/// so readers never see a partial body. Racing writers: last rename wins.
#[derive(Debug, Clone)]
pub struct FsCache {
    dir: PathBuf,
}

impl FsCache {
    /// Use `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, path: &str) -> PathBuf {
        let digest = Sha256::digest(path.as_bytes());
        let name: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.html", name))
    }
}

#[async_trait]
impl CacheStore for FsCache {
    async fn fetch(&self, path: &str, _request: &RequestMeta) -> Result<Option<Bytes>, CacheError> {
        match tokio::fs::read(self.entry_path(path)).await {
            Ok(body) => Ok(Some(Bytes::from(body))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, path: &str, body: Bytes, response: &ResponseMeta) -> Result<(), CacheError> {
        if !response.status.is_success() {
            return Ok(());
        }
        let target = self.entry_path(path);
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&body)?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Unavailable(format!("cache write task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method, StatusCode};

    fn request_meta(path: &str) -> RequestMeta {
        RequestMeta {
            method: Method::GET,
            uri: path.parse().unwrap(),
            headers: HeaderMap::new(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FsCache::open(dir.path()).unwrap();
        let ok = ResponseMeta {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        };
        writer
            .put("/posts/1", Bytes::from_static(b"<h1>post</h1>"), &ok)
            .await
            .unwrap();

        // A second worker sees the same entry
        let reader = FsCache::open(dir.path()).unwrap();
        let body = reader.fetch("/posts/1", &request_meta("/posts/1")).await.unwrap();
        assert_eq!(body.unwrap(), Bytes::from_static(b"<h1>post</h1>"));
        assert!(reader
            .fetch("/posts/2", &request_meta("/posts/2"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_never_expose_partial_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).unwrap();
        let ok = ResponseMeta {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        };
        let bodies: Vec<Bytes> = (0..8u8)
            .map(|n| Bytes::from(vec![b'a' + n; 256 * 1024]))
            .collect();

        for _ in 0..20 {
            let mut tasks = Vec::new();
            for body in &bodies {
                let cache = cache.clone();
                let body = body.clone();
                let ok = ok.clone();
                tasks.push(tokio::spawn(async move {
                    cache.put("/p", body, &ok).await.unwrap();
                    None
                }));
            }
            for _ in 0..8 {
                let cache = cache.clone();
                tasks.push(tokio::spawn(async move {
                    cache.fetch("/p", &request_meta("/p")).await.unwrap()
                }));
            }
            for task in tasks {
                if let Some(read) = task.await.unwrap() {
                    assert!(bodies.contains(&read), "read a body of {} bytes", read.len());
                }
            }
        }

        // Only the entry itself is left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_skips_failed_responses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path().join("nested")).unwrap();
        let not_found = ResponseMeta {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
        };
        cache.put("/gone", Bytes::from_static(b"nope"), &not_found).await.unwrap();
        assert!(cache.fetch("/gone", &request_meta("/gone")).await.unwrap().is_none());
    }
}
