//! Worker side of the process transport.
//!
//! stdin carries `ControlMessage` lines from the master; stdout carries the
//! single `http-online` line back. Logs never go to stdout.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::control::{ControlMessage, ControlReceiver, ReadinessSignal, WorkerSignal};

/// Attach the current process's stdio as a control channel.
///
/// EOF on stdin closes the returned receiver, which the worker treats as
/// `Shutdown` (the master is gone).
pub fn attach() -> (ControlReceiver, ReadinessSignal) {
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match ControlMessage::from_line(&line) {
                    Ok(message) => {
                        if control_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, line = %line, "Ignoring malformed control message"),
                },
                Ok(None) => {
                    tracing::debug!("Control channel closed by master");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Control channel read failed");
                    break;
                }
            }
        }
    });

    let (ready, ready_rx) = ReadinessSignal::channel();
    tokio::spawn(async move {
        if ready_rx.await.is_err() {
            return;
        }
        let mut stdout = tokio::io::stdout();
        let line = WorkerSignal::HttpOnline.to_line();
        if let Err(e) = stdout.write_all(line.as_bytes()).await {
            tracing::error!(error = %e, "Failed to send readiness signal");
            return;
        }
        let _ = stdout.flush().await;
    });

    (control_rx, ready)
}
