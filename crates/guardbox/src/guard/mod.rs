//! Interception layer
//!
//! The child runs a small bootstrap that hooks module import, file open and
//! socket connect, then forwards every attempt over the guard channel. The
//! guards below answer those requests: each one resolves the attempt against
//! the policy, records exactly one operation, and tells the child whether to
//! carry on.
//!
//! Hooks are installed fresh inside each child and die with it. All decisions
//! and records live in the supervising process, so the activity log survives
//! the child being killed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use crate::guard::channel::GuardChannel;
pub use crate::guard::protocol::{
    GuardReply, GuardRequest, ProtocolError, decode_request, encode_reply,
};
use crate::activity::{ActivityRecorder, ExceptionRecord, Verdict};
use crate::config::{EnforcementMode, PolicyConfig};
use crate::policy::{self, Decision, OperationKind};

mod channel;
mod protocol;

/// Python bootstrap executed in place of the user script
pub const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// Environment variable carrying the channel socket path into the child
pub const CHANNEL_ENV: &str = "GUARDBOX_CHANNEL";

/// Exit code the bootstrap uses when it cannot reach the channel
pub const GUARD_INSTALL_EXIT_CODE: i32 = 121;

/// Reason recorded for a restricted operation that audit mode let through
pub const REASON_AUDIT_ONLY: &str = "restricted by policy (audit only)";

/// A blocked operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} of '{target}' blocked: {reason}")]
pub struct PolicyViolation {
    pub kind: OperationKind,
    pub target: String,
    pub reason: String,
    /// Whether the operation must fail in the child
    pub enforced: bool,
}

impl PolicyViolation {
    fn into_reply(self) -> GuardReply {
        GuardReply::Verdict {
            allowed: false,
            proceed: !self.enforced,
            reason: self.reason,
        }
    }
}

fn allowed_reply(decision: Decision) -> GuardReply {
    GuardReply::Verdict {
        allowed: true,
        proceed: true,
        reason: decision.reason.to_string(),
    }
}

#[derive(Debug)]
struct GuardCore {
    policy: Arc<PolicyConfig>,
    recorder: ActivityRecorder,
}

impl GuardCore {
    /// Resolve, record once, and map a block to a violation
    fn check(&self, kind: OperationKind, target: &str) -> Result<Decision, PolicyViolation> {
        let decision = policy::resolve(kind, target, &self.policy);
        let enforced = match self.policy.mode {
            EnforcementMode::Enforce => true,
            EnforcementMode::Audit => false,
        };
        let reason = if decision.allowed || enforced {
            decision.reason
        } else {
            REASON_AUDIT_ONLY
        };

        self.recorder.record_operation(
            kind,
            target,
            Verdict::from_allowed(decision.allowed),
            reason,
        );

        if decision.allowed {
            debug!(%kind, subject = target, "allowed");
            return Ok(decision);
        }

        info!(%kind, subject = target, enforced, "blocked");
        Err(PolicyViolation {
            kind,
            target: target.to_string(),
            reason: reason.to_string(),
            enforced,
        })
    }
}

/// Guards module loading
#[derive(Debug)]
pub struct ImportGuard {
    core: Arc<GuardCore>,
}

impl ImportGuard {
    /// Check an import of the absolute dotted module name
    pub fn check_import(&self, module: &str) -> Result<Decision, PolicyViolation> {
        self.core.check(OperationKind::Import, module)
    }
}

/// How a file is being opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAccess {
    Read,
    Write,
}

impl FileAccess {
    /// Classify an `open()` mode string
    ///
    /// Any of `w`, `a`, `x` or `+` makes it a write; everything else,
    /// including an empty mode, is a read.
    pub fn from_mode(mode: &str) -> Self {
        if mode.contains(['w', 'a', 'x', '+']) {
            FileAccess::Write
        } else {
            FileAccess::Read
        }
    }

    pub fn operation(&self) -> OperationKind {
        match self {
            FileAccess::Read => OperationKind::FileRead,
            FileAccess::Write => OperationKind::FileWrite,
        }
    }
}

/// Guards file opens
#[derive(Debug)]
pub struct FileGuard {
    core: Arc<GuardCore>,
}

impl FileGuard {
    /// Check an open of `path` with the given mode string
    pub fn check_open(&self, path: &str, mode: &str) -> Result<Decision, PolicyViolation> {
        let kind = FileAccess::from_mode(mode).operation();
        self.core.check(kind, path)
    }
}

/// Guards outbound connections
#[derive(Debug)]
pub struct NetworkGuard {
    core: Arc<GuardCore>,
}

impl NetworkGuard {
    /// Check a connection to `host:port`
    pub fn check_connect(&self, address: &str) -> Result<Decision, PolicyViolation> {
        self.core.check(OperationKind::NetworkConnect, address)
    }
}

/// The three guards of one execution, plus exception capture
#[derive(Debug)]
pub struct GuardSet {
    pub imports: ImportGuard,
    pub files: FileGuard,
    pub network: NetworkGuard,
    recorder: ActivityRecorder,
    installed: AtomicBool,
}

impl GuardSet {
    pub fn new(policy: Arc<PolicyConfig>, recorder: ActivityRecorder) -> Self {
        let core = Arc::new(GuardCore {
            policy,
            recorder: recorder.clone(),
        });
        Self {
            imports: ImportGuard { core: core.clone() },
            files: FileGuard { core: core.clone() },
            network: NetworkGuard { core },
            recorder,
            installed: AtomicBool::new(false),
        }
    }

    /// Whether the child has reported its hooks as installed
    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    /// Answer one request from the child
    pub fn handle(&self, request: GuardRequest) -> GuardReply {
        let outcome = match request {
            GuardRequest::Hello { pid } => {
                debug!(pid, "guards installed in child");
                self.installed.store(true, Ordering::Release);
                return GuardReply::ack();
            }
            GuardRequest::Exception {
                exception_type,
                message,
                traceback,
            } => {
                debug!(%exception_type, "unhandled exception in child");
                self.recorder.record_exception(ExceptionRecord {
                    exception_type,
                    message,
                    traceback,
                });
                return GuardReply::ack();
            }
            GuardRequest::Import { target } => self.imports.check_import(&target),
            GuardRequest::Open { target, mode } => self.files.check_open(&target, &mode),
            GuardRequest::Connect { target } => self.network.check_connect(&target),
        };

        if !self.is_installed() {
            warn!("guard request received before hello");
        }

        match outcome {
            Ok(decision) => allowed_reply(decision),
            Err(violation) => violation.into_reply(),
        }
    }
}
