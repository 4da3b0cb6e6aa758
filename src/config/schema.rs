//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the app server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the app server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppServerConfig {
    /// Listener configuration (host/port or unix socket).
    pub listener: ListenerConfig,

    /// Deployment source and fleet size.
    pub app: AppConfig,

    /// Basic auth credentials.
    pub auth: AuthConfig,

    /// Gateway pipeline toggles.
    pub gateway: GatewayConfig,

    /// Response cache backend.
    pub cache: CacheConfig,

    /// Options handed to the render engine.
    pub render: RenderConfig,

    /// Worker restart policy.
    pub supervisor: SupervisorConfig,

    /// Master-side admin API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
///
/// `port` and `socket_path` are mutually exclusive.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (default: all interfaces).
    pub host: Option<String>,

    /// TCP port (default: 3000).
    pub port: Option<u16>,

    /// Unix domain socket path.
    pub socket_path: Option<PathBuf>,
}

/// Resolved listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddress {
    Tcp { host: String, port: u16 },
    Unix { path: PathBuf },
}

impl ListenerConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 3000;

    /// Resolve into a concrete address. Assumes the config was validated.
    pub fn address(&self) -> ListenAddress {
        match &self.socket_path {
            Some(path) => ListenAddress::Unix { path: path.clone() },
            None => ListenAddress::Tcp {
                host: self
                    .host
                    .clone()
                    .unwrap_or_else(|| Self::DEFAULT_HOST.to_string()),
                port: self.port.unwrap_or(Self::DEFAULT_PORT),
            },
        }
    }
}

/// Application bundle source and worker count.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fixed bundle directory.
    pub dist_path: Option<PathBuf>,

    /// Directory that is downloaded from and watched for new bundles.
    pub watch_dir: Option<PathBuf>,

    /// Number of worker processes.
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dist_path: None,
            watch_dir: None,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Basic auth settings. Both fields or neither.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Validated basic auth credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    /// Credentials when both halves are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }
}

/// Gateway pipeline toggles.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Gzip responses when the client accepts it.
    pub gzip: bool,

    /// Cache-Control value for files served under `/assets`.
    pub assets_cache_control: Option<String>,
}

/// Available cache backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    None,
    Memory,
    Fs,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Directory for the `fs` backend, shared by all workers.
    pub dir: Option<PathBuf>,
}

/// Options passed to the render engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RenderConfig {
    /// Stream the document in chunks instead of one write.
    pub chunked_response: bool,

    /// Values exposed to the application sandbox.
    pub sandbox_globals: BTreeMap<String, String>,
}

/// Restart strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartStrategy {
    #[default]
    Immediate,
    Backoff,
}

/// Worker restart policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub restart: RestartStrategy,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart: RestartStrategy::Immediate,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API on the master.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration, shared by master and workers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub logging: LoggingConfig,

    /// Enable the Prometheus endpoint on the master.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// The slice of configuration a worker process needs.
///
/// Serialized into the worker's environment by the master.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct WorkerConfig {
    pub gateway: GatewayConfig,
    pub credentials: Option<Credentials>,
    pub cache: CacheConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

impl AppServerConfig {
    /// Derive the worker-side configuration.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            gateway: self.gateway.clone(),
            credentials: self.auth.credentials(),
            cache: self.cache.clone(),
            render: self.render.clone(),
            logging: self.observability.logging.clone(),
        }
    }
}
