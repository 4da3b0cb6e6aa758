//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AppServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<AppServerConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Read a TOML file without validating it.
///
/// Callers that merge CLI overrides validate afterwards with [`check`].
pub fn read_config(path: &Path) -> Result<AppServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AppServerConfig, ConfigError> {
    let config = read_config(path)?;
    check(&config)?;
    Ok(config)
}

/// Validate, mapping the error list into a [`ConfigError`].
pub fn check(config: &AppServerConfig) -> Result<(), ConfigError> {
    validate_config(config).map_err(ConfigError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            port = 4100
            host = "127.0.0.1"

            [app]
            dist_path = "dist"
            workers = 3

            [cache]
            backend = "memory"
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.port, Some(4100));
        assert_eq!(config.app.workers, 3);
    }

    #[test]
    fn test_validation_errors_are_joined() {
        let err = parse_config("[app]\nworkers = 0\n")
            .and_then(|c| check(&c).map(|_| c))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("worker count must be at least 1"));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            parse_config("[app\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
