//! Resource governor
//!
//! Enforces the wall-clock, memory and CPU ceilings of one execution. The
//! address-space rlimit is applied inside the child before exec; everything
//! else is a watchdog polling /proc while the supervisor waits on the child.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nix::sys::resource::{Resource, getrlimit, setrlimit};
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval, sleep_until};
use tracing::{debug, trace, warn};

pub use crate::governor::procfs::{ProcSample, USER_HZ, parse_cpu_ticks, parse_vm_rss_kb};
use crate::activity::{ActivityRecorder, ResourceLimitEvent};
use crate::types::{LimitKind, ResourceLimits};

mod procfs;

/// Shortest window CPU share is averaged over
const CPU_WINDOW: Duration = Duration::from_millis(500);

/// Errors preparing resource limits
#[derive(Debug, Error)]
pub enum GovernorError {
    #[error("failed to query address space limit: {0}")]
    Rlimit(#[from] nix::errno::Errno),
}

/// A limit that fired
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} limit exceeded: observed {observed:.2}, limit {limit:.2}")]
pub struct ResourceLimitExceeded {
    pub kind: LimitKind,
    /// Seconds, megabytes or percent depending on `kind`
    pub observed: f64,
    pub limit: f64,
}

impl ResourceLimitExceeded {
    pub fn event(&self) -> ResourceLimitEvent {
        ResourceLimitEvent {
            kind: self.kind,
            observed: self.observed,
            limit: self.limit,
        }
    }
}

/// Apply the address-space ceiling to the calling process
///
/// Meant to run in the child between fork and exec.
pub fn apply_rlimits(address_space: Option<u64>) -> std::io::Result<()> {
    if let Some(bytes) = address_space {
        setrlimit(Resource::RLIMIT_AS, bytes, bytes)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
struct CpuWindow {
    started: Instant,
    ticks: u64,
}

/// Watchdog for one child process
#[derive(Debug)]
pub struct ResourceGovernor {
    limits: ResourceLimits,
    peak_rss_kb: AtomicU64,
    cpu_flagged: AtomicBool,
}

impl ResourceGovernor {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            peak_rss_kb: AtomicU64::new(0),
            cpu_flagged: AtomicBool::new(false),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Address-space ceiling for the child, clamped to the current hard limit
    ///
    /// Computed in the parent so the pre-exec hook only has to call setrlimit.
    pub fn address_space_limit(&self) -> Result<Option<u64>, GovernorError> {
        if !self.limits.address_space_limit {
            return Ok(None);
        }
        let (_, hard) = getrlimit(Resource::RLIMIT_AS)?;
        Ok(Some(self.limits.memory_limit_bytes().min(hard)))
    }

    /// Highest resident set size observed, in kilobytes
    pub fn peak_rss_kb(&self) -> Option<u64> {
        match self.peak_rss_kb.load(Ordering::Relaxed) {
            0 => None,
            kb => Some(kb),
        }
    }

    /// Whether the CPU ceiling has been crossed at least once
    pub fn cpu_flagged(&self) -> bool {
        self.cpu_flagged.load(Ordering::Relaxed)
    }

    /// Timeout charged to a child that exited on its own after `elapsed`
    ///
    /// The watchdog has priority over the exit: an exit at or past the
    /// deadline counts as a timeout even if it was observed first.
    pub fn overdue(&self, elapsed: Duration) -> Option<ResourceLimitExceeded> {
        let timeout = self.limits.timeout()?;
        (elapsed >= timeout).then(|| ResourceLimitExceeded {
            kind: LimitKind::Timeout,
            observed: elapsed.as_secs_f64(),
            limit: self.limits.timeout_seconds,
        })
    }

    /// Watch `pid` until a fatal limit fires
    ///
    /// Never returns while the child stays within its limits; the caller
    /// races this against the child exiting. An advisory CPU event is
    /// recorded here; fatal events are left to the caller to record once the
    /// child is dead.
    pub async fn watch(
        &self,
        pid: u32,
        started: Instant,
        recorder: &ActivityRecorder,
    ) -> ResourceLimitExceeded {
        let deadline = self
            .limits
            .timeout()
            .and_then(|timeout| started.checked_add(timeout));
        let timeout = async {
            match deadline {
                Some(deadline) => sleep_until(deadline.into()).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(timeout);

        let sampling = procfs::available();
        if !sampling {
            warn!("/proc is unavailable, only the wall clock limit is enforced");
        }

        let mut ticker = interval(self.limits.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut window: Option<CpuWindow> = None;

        loop {
            tokio::select! {
                biased;

                _ = &mut timeout => {
                    return ResourceLimitExceeded {
                        kind: LimitKind::Timeout,
                        observed: started.elapsed().as_secs_f64(),
                        limit: self.limits.timeout_seconds,
                    };
                }
                _ = ticker.tick(), if sampling => {
                    let sample = match procfs::sample(pid).await {
                        Ok(sample) => sample,
                        Err(e) => {
                            trace!(pid, error = %e, "process sample failed");
                            continue;
                        }
                    };
                    if let Some(exceeded) = self.check_sample(sample, &mut window, recorder) {
                        return exceeded;
                    }
                }
            }
        }
    }

    fn check_sample(
        &self,
        sample: ProcSample,
        window: &mut Option<CpuWindow>,
        recorder: &ActivityRecorder,
    ) -> Option<ResourceLimitExceeded> {
        if let Some(rss_kb) = sample.rss_kb {
            self.peak_rss_kb.fetch_max(rss_kb, Ordering::Relaxed);
            if rss_kb > self.limits.memory_limit_kb() {
                return Some(ResourceLimitExceeded {
                    kind: LimitKind::Memory,
                    observed: rss_kb as f64 / 1024.0,
                    limit: self.limits.memory_limit_mb as f64,
                });
            }
        }

        let ticks = sample.cpu_ticks?;
        let now = Instant::now();
        let Some(current) = *window else {
            *window = Some(CpuWindow {
                started: now,
                ticks,
            });
            return None;
        };

        let elapsed = now.duration_since(current.started);
        if elapsed < CPU_WINDOW {
            return None;
        }
        *window = Some(CpuWindow {
            started: now,
            ticks,
        });

        let share = cpu_share(ticks.saturating_sub(current.ticks), elapsed);
        trace!(share, "cpu share over window");
        if share <= self.limits.cpu_limit_percent {
            return None;
        }

        let exceeded = ResourceLimitExceeded {
            kind: LimitKind::Cpu,
            observed: share,
            limit: self.limits.cpu_limit_percent,
        };
        if self.limits.enforce_cpu_limit {
            return Some(exceeded);
        }
        if !self.cpu_flagged.swap(true, Ordering::Relaxed) {
            debug!(share, "cpu limit exceeded, advisory only");
            recorder.record_limit(exceeded.event());
        }
        None
    }
}

/// Percentage of one core used by `ticks` over `elapsed`
fn cpu_share(ticks: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds <= 0.0 {
        return 0.0;
    }
    ticks as f64 / USER_HZ as f64 / seconds * 100.0
}
