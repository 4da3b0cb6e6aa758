//! Application bundle deployment.
//!
//! # Data Flow
//! ```text
//! Downloader::download → bundle directory → Supervisor (future forks)
//! Notifier → "new bundle" → download again → Reload broadcast
//! ```

pub mod local;
pub mod notifier;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use local::LocalDownloader;
pub use notifier::DirectoryNotifier;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// No bundle has been published yet.
    #[error("app not found")]
    AppNotFound,

    #[error("download failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("failed to watch for new bundles: {0}")]
    Watch(String),
}

/// Fetches the current application bundle to a local directory.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self) -> Result<PathBuf, DownloadError>;
}

/// Announces that a new bundle is available.
pub trait Notifier: Send + Sync {
    /// Send `()` on `tx` whenever a new bundle is available. Notifications
    /// stop when the returned subscription is dropped.
    fn subscribe(&self, tx: mpsc::UnboundedSender<()>) -> Result<Subscription, NotifierError>;
}

/// Keeps a notifier subscription alive.
pub struct Subscription {
    _guard: Box<dyn Send>,
}

impl Subscription {
    pub fn new(guard: impl Send + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}
