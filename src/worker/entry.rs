//! Process entry for a forked worker.
//!
//! The master runs the same binary with the hidden `worker` subcommand.
//! Everything the worker needs arrives through its environment and stdio.

use crate::config::WorkerConfig;
use crate::control::stdio;
use crate::net::SharedListener;
use crate::observability::logging::init_logging;
use crate::worker::env::{WorkerEnv, ENV_WORKER_CONFIG};
use crate::worker::runtime::{Worker, WorkerError, WorkerExit};

fn read_worker_config() -> Result<WorkerConfig, WorkerError> {
    match std::env::var(ENV_WORKER_CONFIG) {
        Ok(raw) => serde_json::from_str(&raw)
            .map_err(|e| WorkerError::Config(format!("{}: {}", ENV_WORKER_CONFIG, e))),
        Err(_) => Ok(WorkerConfig::default()),
    }
}

/// Run a worker until the master tells it to stop.
pub async fn run_worker_process() -> Result<(), WorkerError> {
    let config = read_worker_config()?;
    init_logging(&config.logging);

    let env = WorkerEnv::from_process_env();
    tracing::info!(
        pid = std::process::id(),
        dist_path = ?env.dist_path,
        "worker starting"
    );

    let listener = SharedListener::from_inherited_env()?.into_tokio()?;
    let (control, ready) = stdio::attach();

    let worker = Worker::from_config(config, env)?;
    match worker.start(listener, control, ready).await? {
        WorkerExit::Shutdown => tracing::info!(pid = std::process::id(), "worker stopped"),
        WorkerExit::Reload => tracing::info!(pid = std::process::id(), "worker exiting to pick up a new bundle"),
    }
    std::process::exit(0);
}
