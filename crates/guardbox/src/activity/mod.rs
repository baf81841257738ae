//! Activity recording
//!
//! Append-only, ordered log of every guard decision, unhandled exception and
//! resource-limit event of one execution. Entries are timestamped on append
//! and never removed or reordered.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

pub use crate::activity::report::{
    CategorySummary, ExceptionSummary, ExecutionSummary, Report, ResourceLimitSummary,
};
use crate::policy::OperationKind;
use crate::types::LimitKind;

mod report;

/// Decision recorded for an intercepted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Blocked,
}

impl Verdict {
    pub fn from_allowed(allowed: bool) -> Self {
        if allowed {
            Verdict::Allowed
        } else {
            Verdict::Blocked
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allowed)
    }
}

/// One intercepted attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub kind: OperationKind,
    /// Module name, file path or address
    pub target: String,
    pub decision: Verdict,
    pub reason: String,
}

/// An unhandled error raised by the sandboxed code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    pub exception_type: String,
    pub message: String,
    #[serde(default)]
    pub traceback: String,
}

/// A resource limit that fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimitEvent {
    pub kind: LimitKind,
    /// Observed value (seconds, megabytes or percent depending on `kind`)
    pub observed: f64,
    /// Configured ceiling in the same unit
    pub limit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEntry {
    Operation(OperationRecord),
    Exception(ExceptionRecord),
    ResourceLimit(ResourceLimitEvent),
}

/// A timestamped log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Seconds since the recorder was created
    pub timestamp: f64,

    #[serde(flatten)]
    pub entry: ActivityEntry,
}

impl Activity {
    pub fn operation(&self) -> Option<&OperationRecord> {
        match &self.entry {
            ActivityEntry::Operation(record) => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct RecorderState {
    started_at: DateTime<Local>,
    started: Instant,
    entries: Vec<Activity>,
}

/// Activity log for a single execution
///
/// Clones share the same log; a recorder is never shared across executions.
#[derive(Debug, Clone)]
pub struct ActivityRecorder {
    state: Arc<Mutex<RecorderState>>,
}

impl ActivityRecorder {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecorderState {
                started_at: Local::now(),
                started: Instant::now(),
                entries: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        // A panic while holding the lock cannot leave the Vec half-written
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry, stamping it with the time since the recorder started
    pub fn record(&self, entry: ActivityEntry) {
        let mut state = self.lock();
        let timestamp = state.started.elapsed().as_secs_f64();
        state.entries.push(Activity { timestamp, entry });
    }

    pub fn record_operation(
        &self,
        kind: OperationKind,
        target: impl Into<String>,
        decision: Verdict,
        reason: impl Into<String>,
    ) {
        self.record(ActivityEntry::Operation(OperationRecord {
            kind,
            target: target.into(),
            decision,
            reason: reason.into(),
        }));
    }

    pub fn record_exception(&self, record: ExceptionRecord) {
        self.record(ActivityEntry::Exception(record));
    }

    pub fn record_limit(&self, event: ResourceLimitEvent) {
        self.record(ActivityEntry::ResourceLimit(event));
    }

    /// Copy of all entries in insertion order
    pub fn snapshot(&self) -> Vec<Activity> {
        self.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether any unhandled exception has been recorded
    pub fn has_exception(&self) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|a| matches!(a.entry, ActivityEntry::Exception(_)))
    }

    /// Build the final report from the current log
    pub fn summarize(&self) -> Report {
        let state = self.lock();
        Report::build(
            state.started_at,
            state.started.elapsed(),
            state.entries.clone(),
        )
    }
}

impl Default for ActivityRecorder {
    fn default() -> Self {
        Self::new()
    }
}
