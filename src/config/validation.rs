//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject conflicting deployment sources and listen addresses
//! - Enforce both-or-neither credentials
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppServerConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::{AppServerConfig, CacheBackend, RestartStrategy};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the app server must be provided with either a distPath or a downloader option")]
    MissingSource,

    #[error("the app server must be provided with either a distPath or a downloader option, but not both")]
    ConflictingSources,

    #[error("the app server must be provided with either an IPC path or a port option, but not both")]
    ConflictingListeners,

    #[error("basic auth requires both a username and a password")]
    IncompleteCredentials,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("the fs cache backend requires cache.dir")]
    MissingCacheDir,

    #[error("restart base delay ({base_ms}ms) exceeds max delay ({max_ms}ms)")]
    InvalidBackoff { base_ms: u64, max_ms: u64 },

    #[error("admin API is enabled without an api_key")]
    MissingAdminKey,
}

/// Check a configuration, collecting every error.
pub fn validate_config(config: &AppServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match (&config.app.dist_path, &config.app.watch_dir) {
        (None, None) => errors.push(ValidationError::MissingSource),
        (Some(_), Some(_)) => errors.push(ValidationError::ConflictingSources),
        _ => {}
    }

    if config.listener.port.is_some() && config.listener.socket_path.is_some() {
        errors.push(ValidationError::ConflictingListeners);
    }

    if config.auth.username.is_some() != config.auth.password.is_some() {
        errors.push(ValidationError::IncompleteCredentials);
    }

    if config.app.workers == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    if config.cache.backend == CacheBackend::Fs && config.cache.dir.is_none() {
        errors.push(ValidationError::MissingCacheDir);
    }

    let sup = &config.supervisor;
    if sup.restart == RestartStrategy::Backoff && sup.base_delay_ms > sup.max_delay_ms {
        errors.push(ValidationError::InvalidBackoff {
            base_ms: sup.base_delay_ms,
            max_ms: sup.max_delay_ms,
        });
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
