//! Bundle directory watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::deploy::{Notifier, NotifierError, Subscription};
use crate::render::ENTRY_DOCUMENT;

/// Notifies when the entry document in a directory is created or changed.
#[derive(Debug, Clone)]
pub struct DirectoryNotifier {
    dir: PathBuf,
}

impl DirectoryNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

fn is_bundle_change(event: &Event) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|name| name == ENTRY_DOCUMENT))
}

impl Notifier for DirectoryNotifier {
    fn subscribe(&self, tx: mpsc::UnboundedSender<()>) -> Result<Subscription, NotifierError> {
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_bundle_change(&event) => {
                    tracing::info!("New bundle detected");
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Bundle watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| NotifierError::Watch(e.to_string()))?;

        watcher
            .watch(Path::new(&self.dir), RecursiveMode::NonRecursive)
            .map_err(|e| NotifierError::Watch(format!("{}: {}", self.dir.display(), e)))?;

        tracing::info!(dir = ?self.dir, "Watching for new bundles");
        Ok(Subscription::new(watcher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, RemoveKind};

    #[test]
    fn test_only_entry_document_changes_count() {
        let created = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/dist/index.html"));
        assert!(is_bundle_change(&created));

        let other = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/dist/assets/app.js"));
        assert!(!is_bundle_change(&other));

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/srv/dist/index.html"));
        assert!(!is_bundle_change(&removed));
    }

    #[test]
    fn test_missing_directory_fails_to_subscribe() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = DirectoryNotifier::new("/nonexistent/ssr-watch");
        assert!(notifier.subscribe(tx).is_err());
    }
}
