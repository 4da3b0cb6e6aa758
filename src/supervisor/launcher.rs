//! The seam between the supervisor and whatever runs a worker.

use std::fmt;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::control::{ControlMessage, ControlSender};
use crate::net::ListenerError;
use crate::supervisor::fleet::WorkerId;
use crate::worker::WorkerEnv;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to spawn worker process: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("failed to hand listener to worker: {0}")]
    Listener(#[from] ListenerError),

    #[error("failed to encode worker config: {0}")]
    Config(#[from] serde_json::Error),
}

/// How a worker ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Terminated by a signal, e.g. `SIGKILL`.
    Signal(String),
    /// Exited with a non-zero status.
    Code(i32),
    /// Exited with status 0.
    Graceful,
}

impl ExitReason {
    pub fn from_code(code: i32) -> Self {
        if code == 0 {
            Self::Graceful
        } else {
            Self::Code(code)
        }
    }

    /// Metric label.
    pub fn cause(&self) -> &'static str {
        match self {
            Self::Signal(_) => "signal",
            Self::Code(_) => "error",
            Self::Graceful => "graceful",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(name) => write!(f, "killed by signal {}", name),
            Self::Code(code) => write!(f, "exited with an error code {}", code),
            Self::Graceful => write!(f, "exited gracefully"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker is running but not yet serving.
    Online,
    /// The worker reported readiness.
    Ready,
    /// The worker is gone. Sent exactly once per launch.
    Exited(ExitReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetEvent {
    pub id: WorkerId,
    pub event: WorkerEvent,
}

/// Reports one worker's lifecycle events to the supervisor loop.
#[derive(Debug, Clone)]
pub struct WorkerEvents {
    id: WorkerId,
    tx: mpsc::UnboundedSender<FleetEvent>,
}

impl WorkerEvents {
    pub fn new(id: WorkerId, tx: mpsc::UnboundedSender<FleetEvent>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    fn emit(&self, event: WorkerEvent) {
        // The supervisor may already be gone during teardown.
        let _ = self.tx.send(FleetEvent { id: self.id, event });
    }

    pub fn online(&self) {
        self.emit(WorkerEvent::Online);
    }

    pub fn ready(&self) {
        self.emit(WorkerEvent::Ready);
    }

    pub fn exited(&self, reason: ExitReason) {
        self.emit(WorkerEvent::Exited(reason));
    }
}

/// Supervisor-side handle to one launched worker.
///
/// Dropping the handle kills the worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub pid: Option<u32>,
    control: ControlSender,
    kill: Option<oneshot::Sender<()>>,
}

impl WorkerHandle {
    pub fn new(pid: Option<u32>, control: ControlSender, kill: oneshot::Sender<()>) -> Self {
        Self {
            pid,
            control,
            kill: Some(kill),
        }
    }

    /// Queue a control message. Returns false if the worker is gone.
    pub fn send(&self, message: ControlMessage) -> bool {
        self.control.send(message).is_ok()
    }

    /// Terminate the worker without waiting for it to cooperate.
    pub fn kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

/// Starts workers for the supervisor.
///
/// A launcher must report `Exited` exactly once for every worker it
/// launched successfully, and must kill the worker once its kill switch
/// fires or is dropped.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, env: &WorkerEnv, events: WorkerEvents) -> Result<WorkerHandle, LaunchError>;
}

impl<L: WorkerLauncher + ?Sized> WorkerLauncher for Box<L> {
    fn launch(&self, env: &WorkerEnv, events: WorkerEvents) -> Result<WorkerHandle, LaunchError> {
        (**self).launch(env, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reasons_are_distinct() {
        assert_eq!(ExitReason::from_code(0), ExitReason::Graceful);
        assert_eq!(ExitReason::from_code(3), ExitReason::Code(3));

        assert_eq!(
            ExitReason::Signal("SIGKILL".into()).to_string(),
            "killed by signal SIGKILL"
        );
        assert_eq!(ExitReason::Code(1).to_string(), "exited with an error code 1");
        assert_eq!(ExitReason::Graceful.to_string(), "exited gracefully");
        assert_eq!(ExitReason::Code(1).cause(), "error");
    }

    #[tokio::test]
    async fn test_dropping_handle_fires_kill_switch() {
        let (control, _control_rx) = mpsc::unbounded_channel();
        let (kill, kill_rx) = oneshot::channel();
        let handle = WorkerHandle::new(None, control, kill);
        drop(handle);
        assert!(kill_rx.await.is_err());
    }
}
