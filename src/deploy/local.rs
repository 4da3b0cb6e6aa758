//! Bundles published to a local directory.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::deploy::{DownloadError, Downloader};
use crate::render::ENTRY_DOCUMENT;

/// Serves the bundle found in a fixed directory.
///
/// The directory counts as a bundle once it contains the entry document.
#[derive(Debug, Clone)]
pub struct LocalDownloader {
    dir: PathBuf,
}

impl LocalDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Downloader for LocalDownloader {
    async fn download(&self) -> Result<PathBuf, DownloadError> {
        match tokio::fs::metadata(self.dir.join(ENTRY_DOCUMENT)).await {
            Ok(meta) if meta.is_file() => Ok(self.dir.clone()),
            Ok(_) => Err(DownloadError::AppNotFound),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DownloadError::AppNotFound),
            Err(e) => Err(DownloadError::Failed(format!("{}: {}", self.dir.display(), e))),
        }
    }
}
