//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) + CLI flags
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppServerConfig (validated, immutable)
//!     → worker_config() slice serialized into each worker's environment
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Conflicting options are fatal at construction, never retried

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AppServerConfig, CacheBackend, CacheConfig, Credentials, GatewayConfig, ListenAddress,
    ListenerConfig, LoggingConfig, RenderConfig, WorkerConfig,
};
