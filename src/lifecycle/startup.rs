//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the shared listener once, before any worker is forked
//! - Resolve the first bundle (fixed path, or download)
//! - Start the supervisor and, when managed, follow bundle notifications
//! - Start the admin API and metrics exporter when configured
//!
//! # Design Decisions
//! - A missing bundle is not fatal: workers boot into the fallback page
//! - Any other download failure is fatal before a single fork
//! - A failed notifier subscription is shown to users once the fleet is up

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::validation::ValidationError;
use crate::config::AppServerConfig;
use crate::deploy::{DirectoryNotifier, DownloadError, Downloader, LocalDownloader, Notifier, Subscription};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::handle_signals;
use crate::net::{ListenerError, SharedListener};
use crate::observability::metrics::init_metrics;
use crate::supervisor::policy;
use crate::supervisor::{
    LaunchError, ProcessLauncher, Supervisor, SupervisorError, SupervisorHandle, TaskLauncher,
    WorkerFactory, WorkerLauncher,
};
use crate::worker::WorkerEnv;

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to download application bundle: {0}")]
    Download(DownloadError),

    #[error("admin API failed to bind {address}: {source}")]
    Admin {
        address: String,
        source: std::io::Error,
    },
}

/// Where bundles come from.
#[derive(Clone)]
pub enum AppSource {
    /// A fixed directory.
    DistPath(PathBuf),
    /// Downloaded on boot and again on every notification.
    Managed {
        downloader: Arc<dyn Downloader>,
        notifier: Arc<dyn Notifier>,
    },
}

impl AppSource {
    pub fn from_config(config: &AppServerConfig) -> Result<Self, StartError> {
        match (&config.app.dist_path, &config.app.watch_dir) {
            (Some(path), None) => Ok(Self::DistPath(path.clone())),
            (None, Some(dir)) => Ok(Self::Managed {
                downloader: Arc::new(LocalDownloader::new(dir)),
                notifier: Arc::new(DirectoryNotifier::new(dir)),
            }),
            (None, None) => Err(ValidationError::MissingSource.into()),
            (Some(_), Some(_)) => Err(ValidationError::ConflictingSources.into()),
        }
    }
}

enum LaunchMode {
    Process,
    InProcess(WorkerFactory),
}

pub struct AppServer {
    config: AppServerConfig,
    source: AppSource,
    mode: LaunchMode,
}

impl AppServer {
    pub fn new(config: AppServerConfig, source: AppSource) -> Self {
        Self {
            config,
            source,
            mode: LaunchMode::Process,
        }
    }

    pub fn from_config(config: AppServerConfig) -> Result<Self, StartError> {
        let source = AppSource::from_config(&config)?;
        Ok(Self::new(config, source))
    }

    /// Run workers as tasks in this process instead of forking.
    pub fn in_process(mut self, factory: WorkerFactory) -> Self {
        self.mode = LaunchMode::InProcess(factory);
        self
    }

    async fn initial_bundle(&self) -> Result<Option<PathBuf>, StartError> {
        match &self.source {
            AppSource::DistPath(path) => Ok(Some(path.clone())),
            AppSource::Managed { downloader, .. } => match downloader.download().await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "Bundle downloaded");
                    Ok(Some(path))
                }
                Err(DownloadError::AppNotFound) => {
                    tracing::warn!("app not downloaded");
                    Ok(None)
                }
                Err(e) => Err(StartError::Download(e)),
            },
        }
    }

    fn launcher(&self, listener: SharedListener) -> Result<Box<dyn WorkerLauncher>, StartError> {
        Ok(match &self.mode {
            LaunchMode::Process => Box::new(ProcessLauncher::new(listener, &self.config.worker_config())?),
            LaunchMode::InProcess(factory) => Box::new(TaskLauncher::new(listener, factory.clone())),
        })
    }

    /// Bind, fork the fleet and wait for every worker to be ready.
    pub async fn start(self) -> Result<RunningServer, StartError> {
        let listener = SharedListener::bind(&self.config.listener.address())?;
        let local_addr = listener.local_addr();
        tracing::info!(address = %listener.describe(), "Listener bound");

        let dist_path = self.initial_bundle().await?;

        let mut init_error = None;
        let mut updates = None;
        if let AppSource::Managed { downloader, notifier } = &self.source {
            let (tx, rx) = mpsc::unbounded_channel();
            match notifier.subscribe(tx) {
                Ok(subscription) => updates = Some((downloader.clone(), subscription, rx)),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to subscribe to bundle notifications");
                    init_error = Some(e.to_string());
                }
            }
        }

        if self.config.observability.metrics_enabled {
            match self.config.observability.metrics_address.parse() {
                Ok(addr) => init_metrics(addr),
                Err(_) => tracing::error!(
                    metrics_address = %self.config.observability.metrics_address,
                    "Failed to parse metrics address"
                ),
            }
        }

        let supervisor = Supervisor::new(
            self.config.app.workers,
            WorkerEnv::new(dist_path),
            self.launcher(listener)?,
        )
        .with_policy(policy::from_config(&self.config.supervisor));
        let handle = supervisor.start().await?;
        tracing::info!(workers = self.config.app.workers, "All workers ready");

        if let Some(detail) = init_error {
            handle.report_error(detail);
        }

        let shutdown = Shutdown::new();
        let mut tasks = Vec::new();

        if let Some((downloader, subscription, rx)) = updates {
            let handle_for_updates = handle.clone();
            let stopped = shutdown.signalled();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    _ = follow_bundles(handle_for_updates, downloader, subscription, rx) => {}
                    _ = stopped => {}
                }
            }));
        }

        let mut admin_addr = None;
        if self.config.admin.enabled {
            let address = self.config.admin.bind_address.clone();
            let admin_listener = match tokio::net::TcpListener::bind(&address).await {
                Ok(listener) => listener,
                Err(source) => {
                    handle.stop();
                    return Err(StartError::Admin { address, source });
                }
            };
            admin_addr = admin_listener.local_addr().ok();
            let router = setup_admin_router(AdminState {
                supervisor: handle.clone(),
                api_key: self.config.admin.api_key.as_str().into(),
            });
            let stopped = shutdown.signalled();
            tracing::info!(address = %address, "Admin API listening");
            tasks.push(tokio::spawn(async move {
                if let Err(e) = axum::serve(admin_listener, router)
                    .with_graceful_shutdown(stopped)
                    .await
                {
                    tracing::error!(error = %e, "Admin API failed");
                }
            }));
        }

        Ok(RunningServer {
            supervisor: handle,
            local_addr,
            admin_addr,
            shutdown,
            tasks,
        })
    }
}

/// Re-download on every notification and roll the fleet onto the result.
async fn follow_bundles(
    supervisor: SupervisorHandle,
    downloader: Arc<dyn Downloader>,
    _subscription: Subscription,
    mut notifications: mpsc::UnboundedReceiver<()>,
) {
    while notifications.recv().await.is_some() {
        // Collapse a burst of notifications into one download.
        while notifications.try_recv().is_ok() {}

        tracing::info!("New bundle available, downloading");
        match downloader.download().await {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Bundle downloaded, reloading workers");
                supervisor.update_bundle(Some(path));
            }
            Err(DownloadError::AppNotFound) => {
                tracing::warn!("app not downloaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "Bundle download failed");
                supervisor.report_error(e.to_string());
            }
        }
    }
}

/// A started server: the fleet plus the master's auxiliary tasks.
pub struct RunningServer {
    supervisor: SupervisorHandle,
    local_addr: Option<SocketAddr>,
    admin_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    pub fn supervisor(&self) -> &SupervisorHandle {
        &self.supervisor
    }

    /// Bound TCP address, `None` for unix sockets.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn admin_addr(&self) -> Option<SocketAddr> {
        self.admin_addr
    }

    /// Stop the fleet and wait for every worker to exit.
    pub async fn stop(self) {
        self.supervisor.stop();
        if self.supervisor.wait().await.is_err() {
            tracing::warn!("Supervisor ended before the fleet stopped");
        }
        self.finish().await;
    }

    /// Follow process signals until a shutdown signal stops the fleet.
    pub async fn run_until_signal(self) -> std::io::Result<()> {
        handle_signals(self.supervisor.clone()).await?;
        self.finish().await;
        Ok(())
    }

    async fn finish(self) {
        self.shutdown.trigger();
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("Shutdown complete");
    }
}
