use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default guest command line
pub const DEFAULT_INTERPRETER_COMMAND: [&str; 4] = ["python3", "-u", "{bootstrap}", "{source}"];

/// Configuration for the guest interpreter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {bootstrap}, {source}
    pub command: Vec<String>,

    /// PATH for the child
    ///
    /// Defaults to the PATH of the supervising process if not specified.
    pub path: Option<String>,

    /// Extra environment variables for the child
    pub env: HashMap<String, String>,
}

impl InterpreterConfig {
    /// Expand placeholders in the configured command
    pub fn expand_command(&self, bootstrap: &str, source: &str) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{bootstrap}", bootstrap)
                    .replace("{source}", source)
            })
            .collect()
    }

    /// PATH handed to the child
    pub fn effective_path(&self) -> String {
        self.path
            .clone()
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_else(|| "/usr/local/bin:/usr/bin:/bin".to_string())
    }
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_INTERPRETER_COMMAND
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
            path: None,
            env: HashMap::new(),
        }
    }
}
