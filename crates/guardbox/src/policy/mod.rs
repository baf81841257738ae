//! Policy resolution
//!
//! A pure decision function over (operation kind, target, policy). Resolution
//! is evaluated in a fixed order and the first match wins:
//!
//! 1. the category's allow-set matches the target: allowed
//! 2. the category's deny-set matches, or its gate is closed: blocked
//! 3. otherwise: allowed
//!
//! An allowlist entry therefore always beats a denylist entry for the same
//! target.

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::policy::matcher::{normalize_path, path_matches, split_address};
use crate::config::PolicyConfig;

mod matcher;

/// Reason given when an allow-set entry matched
pub const REASON_ALLOWLISTED: &str = "explicitly allowlisted";
/// Reason given when a deny-set entry matched or the category gate is closed
pub const REASON_RESTRICTED: &str = "restricted by policy";
/// Reason given when nothing matched
pub const REASON_DEFAULT_ALLOW: &str = "default allow — not restricted";

/// Kind of intercepted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Import,
    FileRead,
    FileWrite,
    NetworkConnect,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Import => "import",
            OperationKind::FileRead => "file_read",
            OperationKind::FileWrite => "file_write",
            OperationKind::NetworkConnect => "network_connect",
        }
    }

    /// Report category this kind is counted under
    pub fn category(&self) -> Category {
        match self {
            OperationKind::Import => Category::Imports,
            OperationKind::FileRead | OperationKind::FileWrite => Category::FileOperations,
            OperationKind::NetworkConnect => Category::NetworkOperations,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Report category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Imports,
    FileOperations,
    NetworkOperations,
}

/// Outcome of resolving one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: &'static str,
}

impl Decision {
    pub const fn allow(reason: &'static str) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub const fn block(reason: &'static str) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Resolve an operation against the policy
pub fn resolve(kind: OperationKind, target: &str, policy: &PolicyConfig) -> Decision {
    if is_allowlisted(kind, target, policy) {
        return Decision::allow(REASON_ALLOWLISTED);
    }
    if is_restricted(kind, target, policy) {
        return Decision::block(REASON_RESTRICTED);
    }
    Decision::allow(REASON_DEFAULT_ALLOW)
}

fn is_allowlisted(kind: OperationKind, target: &str, policy: &PolicyConfig) -> bool {
    match kind {
        OperationKind::Import => policy.allowed_imports.contains(target),
        OperationKind::FileRead | OperationKind::FileWrite => policy
            .allowed_file_paths
            .iter()
            .any(|allowed| path_matches(allowed, target)),
        OperationKind::NetworkConnect => policy
            .allowed_network_addresses
            .iter()
            .any(|allowed| matcher::address_matches(allowed, target)),
    }
}

fn is_restricted(kind: OperationKind, target: &str, policy: &PolicyConfig) -> bool {
    match kind {
        OperationKind::Import => policy.restricted_imports.contains(target),
        OperationKind::FileRead => !policy.allow_file_read,
        OperationKind::FileWrite => !policy.allow_file_write,
        OperationKind::NetworkConnect => !policy.allow_network,
    }
}
