use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::Report;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Wall clock time limit in seconds
    pub timeout_seconds: f64,

    /// Resident memory ceiling in megabytes
    pub memory_limit_mb: u64,

    /// CPU share ceiling in percent of one core
    pub cpu_limit_percent: f64,

    /// Terminate the child when the CPU ceiling is exceeded.
    ///
    /// Off by default: a CPU violation is recorded but the child keeps running.
    pub enforce_cpu_limit: bool,

    /// Apply RLIMIT_AS equal to the memory ceiling before exec.
    ///
    /// This turns runaway allocations into allocation failures inside the
    /// child. The watchdog still samples resident memory either way.
    pub address_space_limit: bool,

    /// Watchdog sampling period in milliseconds
    pub poll_interval_ms: u64,
}

impl ResourceLimits {
    /// 1 megabyte in kilobytes
    pub const MB: u64 = 1024;

    /// Create new resource limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall clock time limit in seconds
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set the memory ceiling in megabytes
    pub fn with_memory_limit_mb(mut self, mb: u64) -> Self {
        self.memory_limit_mb = mb;
        self
    }

    /// Set the CPU ceiling in percent
    pub fn with_cpu_limit_percent(mut self, percent: f64) -> Self {
        self.cpu_limit_percent = percent;
        self
    }

    /// Make CPU violations fatal
    pub fn with_enforced_cpu_limit(mut self, enforce: bool) -> Self {
        self.enforce_cpu_limit = enforce;
        self
    }

    /// Wall clock limit as a duration, `None` if the value is not a valid duration
    pub fn timeout(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).ok()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Memory ceiling in kilobytes
    pub fn memory_limit_kb(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(Self::MB)
    }

    /// Memory ceiling in bytes
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_kb().saturating_mul(1024)
    }
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: 10.0,
            memory_limit_mb: 128,
            cpu_limit_percent: 50.0,
            enforce_cpu_limit: false,
            address_space_limit: true,
            poll_interval_ms: 50,
        }
    }
}

/// Which resource limit fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitKind {
    /// Wall clock timeout
    Timeout,

    /// Resident memory ceiling
    Memory,

    /// CPU share ceiling
    Cpu,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::Timeout => "timeout",
            LimitKind::Memory => "memory",
            LimitKind::Cpu => "cpu",
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Child exited on its own, with any exit code
    Completed,

    /// Wall clock limit fired and the child was killed
    TimedOut,

    /// Memory (or enforced CPU) limit fired and the child was killed
    Terminated,

    /// User code raised an unhandled exception
    CrashedWithException,
}

impl ExecutionStatus {
    /// Status for a run ended by the given limit
    pub fn from_limit(kind: LimitKind) -> Self {
        match kind {
            LimitKind::Timeout => ExecutionStatus::TimedOut,
            LimitKind::Memory | LimitKind::Cpu => ExecutionStatus::Terminated,
        }
    }
}

/// Result of an execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Terminal status
    pub status: ExecutionStatus,

    /// The limit that ended the run, if any
    pub limit_exceeded: Option<LimitKind>,

    /// Exit code if the child exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the child was killed by a signal
    pub signal: Option<i32>,

    /// Wall clock time from launch to exit
    pub duration: Duration,

    /// Peak resident set size in kilobytes, when it could be sampled
    pub peak_memory_kb: Option<u64>,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Finalized activity report
    pub report: Report,
}

impl ExecutionResult {
    /// Check if the sandboxed code ran to completion with exit code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Completed) && self.exit_code == Some(0)
    }

    /// Human-readable description of how the child ended
    pub fn termination_reason(&self) -> String {
        if let Some(kind) = self.limit_exceeded {
            return format!("{kind} limit exceeded");
        }
        match (self.exit_code, self.signal) {
            (Some(code), _) => format!("exited with code {code}"),
            (None, Some(signal)) => format!("killed by signal {signal}"),
            (None, None) => "unknown".to_string(),
        }
    }
}
