//! Workers as OS processes.
//!
//! Each worker is this binary re-executed with the `worker` subcommand. It
//! inherits the listening socket, reads its config from the environment,
//! takes control messages on stdin and reports readiness on stdout.

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::Signal;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

use crate::config::WorkerConfig;
use crate::control::{ControlMessage, WorkerSignal};
use crate::net::SharedListener;
use crate::supervisor::launcher::{ExitReason, LaunchError, WorkerEvents, WorkerHandle, WorkerLauncher};
use crate::worker::env::{WorkerEnv, ENV_DIST_PATH, ENV_WORKER_CONFIG};

/// Subcommand that runs a worker.
pub const WORKER_SUBCOMMAND: &str = "worker";

pub struct ProcessLauncher {
    // Held open so every fork inherits the same descriptor.
    listener: SharedListener,
    program: PathBuf,
    args: Vec<String>,
    listener_env: Vec<(String, String)>,
    config_json: String,
}

impl ProcessLauncher {
    /// Launch workers by re-executing the current binary.
    pub fn new(listener: SharedListener, config: &WorkerConfig) -> Result<Self, LaunchError> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: vec![WORKER_SUBCOMMAND.to_string()],
            listener_env: listener.inheritable_env()?,
            config_json: serde_json::to_string(config)?,
            listener,
        })
    }

    pub fn listener(&self) -> &SharedListener {
        &self.listener
    }

    /// Use a different worker executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = program.into();
        self.args = args;
        self
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, env: &WorkerEnv, events: WorkerEvents) -> Result<WorkerHandle, LaunchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.listener_env.iter().map(|(k, v)| (k, v)))
            .env(ENV_WORKER_CONFIG, &self.config_json)
            .env_remove(ENV_DIST_PATH)
            .envs(env.vars())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        if let Some(stdin) = stdin {
            tokio::spawn(forward_control(stdin, control_rx));
        }
        events.online();
        tokio::spawn(monitor(child, stdout, kill_rx, events));

        Ok(WorkerHandle::new(pid, control_tx, kill_tx))
    }
}

/// Write control messages to the worker's stdin. Closing stdin tells the
/// worker the master is gone.
async fn forward_control(mut stdin: ChildStdin, mut control: mpsc::UnboundedReceiver<ControlMessage>) {
    while let Some(message) = control.recv().await {
        let line = message.to_line();
        if stdin.write_all(line.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn monitor(
    mut child: Child,
    stdout: Option<ChildStdout>,
    mut kill: oneshot::Receiver<()>,
    events: WorkerEvents,
) {
    let mut lines = stdout.map(|out| BufReader::new(out).lines());

    let status = loop {
        tokio::select! {
            status = child.wait() => break Some(status),
            _ = &mut kill => break None,
            line = next_line(&mut lines), if lines.is_some() => match line {
                Some(line) => match WorkerSignal::from_line(&line) {
                    Ok(WorkerSignal::HttpOnline) => events.ready(),
                    Err(_) => tracing::debug!(worker = events.id(), line = %line, "Unexpected worker output"),
                },
                None => lines = None,
            },
        }
    };

    let status = match status {
        Some(status) => status,
        None => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(worker = events.id(), error = %e, "Failed to kill worker");
            }
            child.wait().await
        }
    };

    let reason = match status {
        Ok(status) => exit_reason(status),
        Err(e) => {
            tracing::error!(worker = events.id(), error = %e, "Failed to reap worker");
            ExitReason::Code(-1)
        }
    };
    events.exited(reason);
}

async fn next_line(
    lines: &mut Option<tokio::io::Lines<BufReader<ChildStdout>>>,
) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

fn exit_reason(status: ExitStatus) -> ExitReason {
    if let Some(signo) = status.signal() {
        let name = Signal::try_from(signo)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| signo.to_string());
        return ExitReason::Signal(name);
    }
    ExitReason::from_code(status.code().unwrap_or(-1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_reason_from_status() {
        assert_eq!(exit_reason(ExitStatus::from_raw(0)), ExitReason::Graceful);
        // Raw wait status: exit code in the high byte.
        assert_eq!(exit_reason(ExitStatus::from_raw(2 << 8)), ExitReason::Code(2));
        assert_eq!(
            exit_reason(ExitStatus::from_raw(9)),
            ExitReason::Signal("SIGKILL".into())
        );
    }
}
