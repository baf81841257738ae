use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::interpreter::{DEFAULT_INTERPRETER_COMMAND, InterpreterConfig};
pub use crate::config::policy::{DEFAULT_RESTRICTED_IMPORTS, EnforcementMode, PolicyConfig};
use crate::types::ResourceLimits;

pub mod interpreter;
mod loader;
pub mod policy;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../guardbox.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for one execution
///
/// Built once per request and never mutated after the execution starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Guest interpreter settings
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    /// Resource ceilings enforced by the governor
    #[serde(default)]
    pub limits: ResourceLimits,

    /// Allow/deny rules for intercepted operations
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Config {
    /// Create a new config from the embedded defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config with an empty policy: no restrictions, no allow-lists,
    /// all gates closed
    pub fn empty() -> Self {
        Self {
            interpreter: InterpreterConfig::default(),
            limits: ResourceLimits::default(),
            policy: PolicyConfig::empty(),
        }
    }

    /// Replace the resource limits
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the policy
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}
