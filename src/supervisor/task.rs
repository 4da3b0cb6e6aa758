//! Workers as tasks inside the master process.
//!
//! Same lifecycle contract as [`ProcessLauncher`](super::process::ProcessLauncher)
//! without the fork. Each worker serves on a duplicate of the shared socket.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::control::ReadinessSignal;
use crate::net::SharedListener;
use crate::supervisor::launcher::{ExitReason, LaunchError, WorkerEvents, WorkerHandle, WorkerLauncher};
use crate::worker::{Worker, WorkerEnv, WorkerExit};

/// Builds the worker for one launch.
pub type WorkerFactory = Arc<dyn Fn(WorkerEnv) -> Worker + Send + Sync>;

pub struct TaskLauncher {
    listener: SharedListener,
    factory: WorkerFactory,
}

impl TaskLauncher {
    pub fn new(listener: SharedListener, factory: WorkerFactory) -> Self {
        Self { listener, factory }
    }
}

impl WorkerLauncher for TaskLauncher {
    fn launch(&self, env: &WorkerEnv, events: WorkerEvents) -> Result<WorkerHandle, LaunchError> {
        let listener = self.listener.try_clone()?.into_tokio()?;
        let worker = (self.factory)(env.clone());

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (ready, mut ready_rx) = ReadinessSignal::channel();
        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

        let mut task = tokio::spawn(worker.start(listener, control_rx, ready));
        events.online();

        tokio::spawn(async move {
            let abort = task.abort_handle();
            let mut kill_armed = true;
            let mut ready_pending = true;

            let result = loop {
                tokio::select! {
                    result = &mut task => break result,
                    _ = &mut kill_rx, if kill_armed => {
                        kill_armed = false;
                        abort.abort();
                    }
                    ready = &mut ready_rx, if ready_pending => {
                        ready_pending = false;
                        if ready.is_ok() {
                            events.ready();
                        }
                    }
                }
            };

            let reason = match result {
                Ok(Ok(WorkerExit::Shutdown | WorkerExit::Reload)) => ExitReason::Graceful,
                Ok(Err(e)) => {
                    tracing::error!(worker = events.id(), error = %e, "Worker failed");
                    ExitReason::Code(1)
                }
                Err(e) if e.is_cancelled() => ExitReason::Signal("SIGKILL".to_string()),
                Err(_) => ExitReason::Code(101),
            };
            events.exited(reason);
        });

        Ok(WorkerHandle::new(None, control_tx, kill_tx))
    }
}
