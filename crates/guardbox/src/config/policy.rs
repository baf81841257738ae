use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Modules restricted when no policy is configured
pub const DEFAULT_RESTRICTED_IMPORTS: [&str; 6] =
    ["os", "sys", "subprocess", "shutil", "socket", "urllib"];

/// What a guard does with a blocked operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementMode {
    /// The operation fails inside the child
    #[default]
    Enforce,

    /// The operation is recorded as blocked but proceeds, with a warning on
    /// the child's stderr
    Audit,
}

/// Allow/deny rules for the three intercepted categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub mode: EnforcementMode,

    /// Gate for opening files for reading
    pub allow_file_read: bool,

    /// Gate for opening files for writing, appending or creating
    pub allow_file_write: bool,

    /// Gate for outbound connections
    pub allow_network: bool,

    /// Module names whose import is denied (exact match)
    pub restricted_imports: BTreeSet<String>,

    /// Module names always allowed, even if restricted
    pub allowed_imports: BTreeSet<String>,

    /// Paths that may be opened, along with everything under them
    pub allowed_file_paths: BTreeSet<String>,

    /// `host` or `host:port` entries that may be connected to
    pub allowed_network_addresses: BTreeSet<String>,
}

impl PolicyConfig {
    /// A policy with no restrictions and no allow-lists; every gate is closed
    pub fn empty() -> Self {
        Self {
            mode: EnforcementMode::Enforce,
            allow_file_read: false,
            allow_file_write: false,
            allow_network: false,
            restricted_imports: BTreeSet::new(),
            allowed_imports: BTreeSet::new(),
            allowed_file_paths: BTreeSet::new(),
            allowed_network_addresses: BTreeSet::new(),
        }
    }

    /// Whether blocked operations fail in the child
    pub fn enforces(&self) -> bool {
        matches!(self.mode, EnforcementMode::Enforce)
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            restricted_imports: DEFAULT_RESTRICTED_IMPORTS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            ..Self::empty()
        }
    }
}
