//! A library for policy-guarded code execution.
//!
//! Guardbox runs untrusted Python code in a child process, intercepts its
//! imports, file opens and outbound connections, decides each one against a
//! configurable policy, and enforces wall-clock, memory and CPU ceilings.
//! Every decision is recorded and summarized in a structured report.
//!
//! # Features
//!
//! - **Policy resolution** — Allow-lists beat deny-lists, then per-category gates.
//! - **Interception** — Import, file and network guards installed fresh in each child.
//! - **Audit mode** — Record what would have been blocked without breaking the run.
//! - **Resource limits** — Timeout, resident memory, address space and CPU share.
//! - **Activity reports** — Ordered log with per-category totals, serializable as JSON.
//! - **TOML configuration** — Interpreter, limits and policy in one file.
//!
//! Interception hooks the entry points available to the running code. Code
//! that reaches a capability through a channel those hooks do not cover is
//! not contained; this is policy enforcement with auditing, not a hardened
//! sandbox.
//!
//! Import names match exactly. Restricting `os` does not block
//! `import os.path`, and that statement still binds `os` in the caller's
//! namespace. Restrict the dotted names too when that matters.
//!
//! Imports performed by standard-library modules while they load are neither
//! decided nor recorded; only imports issued from user or third-party code
//! appear in the report.

pub use activity::{ActivityRecorder, Report};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, EnforcementMode, PolicyConfig};
pub use governor::{ResourceGovernor, ResourceLimitExceeded};
pub use guard::{FileGuard, GuardSet, ImportGuard, NetworkGuard, PolicyViolation};
pub use policy::{Decision, OperationKind, resolve};
pub use supervisor::{Supervisor, SupervisorError};
pub use types::{ExecutionResult, ExecutionStatus, LimitKind, ResourceLimits};

pub mod activity;
pub mod config;
pub mod governor;
pub mod guard;
pub mod policy;
pub mod supervisor;
pub mod types;
