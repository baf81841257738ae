//! Configuration file loading for guardbox
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::ReadFile {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if !(limits.timeout_seconds.is_finite() && limits.timeout_seconds > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "timeout_seconds must be a positive number, got {}",
                limits.timeout_seconds
            )));
        }
        if limits.memory_limit_mb == 0 {
            return Err(ConfigError::Invalid(
                "memory_limit_mb must be positive".to_string(),
            ));
        }
        let cpu = limits.cpu_limit_percent;
        if !(cpu.is_finite() && cpu > 0.0 && cpu <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "cpu_limit_percent must be in (0, 100], got {cpu}"
            )));
        }
        if limits.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }

        let command = &self.interpreter.command;
        if command.is_empty() || command[0].is_empty() {
            return Err(ConfigError::Invalid(
                "interpreter has empty command".to_string(),
            ));
        }
        if !command.iter().any(|arg| arg.contains("{bootstrap}")) {
            return Err(ConfigError::Invalid(
                "interpreter command must reference {bootstrap}".to_string(),
            ));
        }

        Ok(())
    }
}
