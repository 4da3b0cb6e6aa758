//! Environment handed from the supervisor to each forked worker.

use std::path::PathBuf;

/// Env var naming the bundle directory.
pub const ENV_DIST_PATH: &str = "SSR_DIST_PATH";

/// Env var carrying the serialized `WorkerConfig`.
pub const ENV_WORKER_CONFIG: &str = "SSR_WORKER_CONFIG";

/// Derived per-fork environment: where to find the application bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerEnv {
    pub dist_path: Option<PathBuf>,
}

impl WorkerEnv {
    pub fn new(dist_path: Option<PathBuf>) -> Self {
        Self { dist_path }
    }

    /// Variables to set on the child process.
    pub fn vars(&self) -> Vec<(String, String)> {
        self.dist_path
            .iter()
            .map(|p| (ENV_DIST_PATH.to_string(), p.display().to_string()))
            .collect()
    }

    /// Read the environment of the current (worker) process.
    pub fn from_process_env() -> Self {
        Self {
            dist_path: std::env::var_os(ENV_DIST_PATH)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }
}
