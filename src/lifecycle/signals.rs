//! OS signal handling for the master.
//!
//! # Responsibilities
//! - SIGHUP broadcasts `Reload`
//! - SIGTERM/SIGINT stop the fleet and return once it has stopped
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT while stopping kills the fleet

use tokio::signal::unix::{signal, SignalKind};

use crate::supervisor::SupervisorHandle;

/// Drive the fleet from process signals until it has stopped.
pub async fn handle_signals(supervisor: SupervisorHandle) -> std::io::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading workers");
                supervisor.reload();
            }
            _ = terminate.recv() => break,
            _ = interrupt.recv() => break,
        }
    }

    tracing::info!("Shutdown signal received, stopping workers");
    supervisor.stop();

    tokio::select! {
        result = supervisor.wait() => {
            if result.is_err() {
                tracing::warn!("Supervisor ended before the fleet stopped");
            }
        }
        _ = terminate.recv() => force_stop(&supervisor),
        _ = interrupt.recv() => force_stop(&supervisor),
    }
    Ok(())
}

fn force_stop(supervisor: &SupervisorHandle) {
    tracing::warn!("Second shutdown signal, killing workers");
    for worker in supervisor.snapshot().workers {
        supervisor.kill(worker.id);
    }
}
