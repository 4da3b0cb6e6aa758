//! One worker: a gateway, a render engine and a control-message loop.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::cache::{self, CacheError, CacheStore};
use crate::config::WorkerConfig;
use crate::control::{ControlMessage, ControlReceiver, ReadinessSignal};
use crate::gateway::{GatewayOptions, GatewayServer, RenderStage};
use crate::net::{GatewayListener, ListenerError};
use crate::render::{shell_factory, RenderOptions, Renderer, RendererFactory};
use crate::worker::env::WorkerEnv;
use crate::worker::fallback::BootErrorSlot;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid worker configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("HTTP server failed: {0}")]
    Serve(#[from] std::io::Error),
}

/// Why [`Worker::start`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// `Shutdown` received or the control channel closed.
    Shutdown,
    /// `Reload` received while serving the fallback page. The replacement
    /// fork boots with the bundle the master currently hands out.
    Reload,
}

pub struct Worker {
    config: WorkerConfig,
    dist_path: Option<PathBuf>,
    cache: Option<Arc<dyn CacheStore>>,
    renderer_factory: RendererFactory,
    boot_errors: BootErrorSlot,
}

impl Worker {
    /// A worker without a cache, using the shell renderer.
    pub fn new(config: WorkerConfig, env: WorkerEnv) -> Self {
        Self {
            config,
            dist_path: env.dist_path,
            cache: None,
            renderer_factory: shell_factory(),
            boot_errors: BootErrorSlot::new(),
        }
    }

    /// A worker with the cache backend named in its config.
    pub fn from_config(config: WorkerConfig, env: WorkerEnv) -> Result<Self, WorkerError> {
        let cache = cache::from_config(&config.cache)?;
        let mut worker = Self::new(config, env);
        worker.cache = cache;
        Ok(worker)
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_renderer_factory(mut self, factory: RendererFactory) -> Self {
        self.renderer_factory = factory;
        self
    }

    /// Handle to the error shown by the fallback page.
    pub fn boot_errors(&self) -> BootErrorSlot {
        self.boot_errors.clone()
    }

    fn build_stage(&self) -> (RenderStage, Option<Arc<dyn Renderer>>) {
        let Some(dist_path) = &self.dist_path else {
            tracing::warn!("No application bundle configured, serving fallback page");
            return (RenderStage::Unavailable(self.boot_errors.clone()), None);
        };

        let options = RenderOptions {
            dist_path: dist_path.clone(),
            sandbox_globals: self.config.render.sandbox_globals.clone(),
            chunked_response: self.config.render.chunked_response,
        };
        match (self.renderer_factory)(options) {
            Ok(renderer) => (RenderStage::App(renderer.clone()), Some(renderer)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to load application bundle");
                self.boot_errors.record(e.to_string());
                (RenderStage::Unavailable(self.boot_errors.clone()), None)
            }
        }
    }

    /// Build the pipeline, serve, report ready and follow control messages.
    pub async fn start(
        self,
        listener: GatewayListener,
        mut control: ControlReceiver,
        ready: ReadinessSignal,
    ) -> Result<WorkerExit, WorkerError> {
        let (stage, renderer) = self.build_stage();

        let server = GatewayServer::new(
            GatewayOptions {
                gateway: self.config.gateway.clone(),
                credentials: self.config.credentials.clone(),
                dist_path: self.dist_path.clone(),
                cache: self.cache.clone(),
            },
            stage,
        );

        tracing::info!("starting HTTP server");
        // Dropping this future stops accepting on this worker's copy of the socket.
        let serving = server.serve(listener);
        tokio::pin!(serving);
        ready.send();

        loop {
            tokio::select! {
                result = &mut serving => {
                    return match result {
                        Ok(()) => Err(WorkerError::Serve(std::io::Error::other("server stopped"))),
                        Err(e) => Err(WorkerError::Serve(e)),
                    };
                }
                message = control.recv() => match message {
                    Some(ControlMessage::Reload) => match &renderer {
                        // Runs beside the accept loop, which keeps serving the old bundle.
                        Some(renderer) => {
                            let renderer = renderer.clone();
                            tokio::spawn(async move {
                                if let Err(e) = renderer.reload().await {
                                    tracing::error!(error = %e, "Reload failed, keeping current bundle");
                                }
                            });
                        }
                        None => {
                            tracing::info!("Reload requested without a loaded application, exiting for a fresh fork");
                            return Ok(WorkerExit::Reload);
                        }
                    },
                    Some(ControlMessage::Error { detail }) => {
                        tracing::warn!(detail = %detail, "Recorded error from master");
                        self.boot_errors.record(detail);
                    }
                    Some(ControlMessage::Shutdown) | None => {
                        tracing::info!("Shutting down worker");
                        return Ok(WorkerExit::Shutdown);
                    }
                },
            }
        }
    }
}
