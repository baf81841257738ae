//! Execution supervisor
//!
//! Owns the lifecycle of one execution: workspace, guard channel, child
//! process, watchdog and final report.
//!
//! ```text
//! Created -> Launched -> Running -> Completed | TimedOut | Terminated
//!                                   | CrashedWithException -> ReportBuilt
//! ```

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

pub use crate::supervisor::process::{ChildProcess, LaunchSpec, MAX_OUTPUT_BYTES};
pub use crate::supervisor::workspace::Workspace;
use crate::activity::ActivityRecorder;
use crate::config::{Config, ConfigError};
use crate::governor::{GovernorError, ResourceGovernor, ResourceLimitExceeded};
use crate::guard::{CHANNEL_ENV, GUARD_INSTALL_EXIT_CODE, GuardChannel, GuardSet};
use crate::types::{ExecutionResult, ExecutionStatus};

mod process;
mod workspace;

/// How long the guard broker gets to answer in-flight requests after the
/// child is gone
const BROKER_DRAIN: Duration = Duration::from_secs(1);

/// How long output readers get to reach EOF after the child is gone
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Failures that prevent the sandbox from running at all
///
/// Distinct from a sandboxed program failing, which is reported through
/// [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to bind guard channel at {path}: {source}")]
    Channel {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("guards could not be installed in the child: {0}")]
    GuardInstall(String),

    #[error("failed to prepare resource limits: {0}")]
    Governor(#[from] GovernorError),

    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),
}

enum Race {
    Exited(io::Result<std::process::ExitStatus>),
    Limit(ResourceLimitExceeded),
}

/// Runs untrusted code under a policy and resource limits
#[derive(Debug, Clone)]
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    /// Create a new supervisor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Create a new supervisor with default configuration
    pub fn with_defaults() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute `code` in a fresh child and report what it did
    ///
    /// Every call builds its own recorder, guards and governor. Returns `Err`
    /// only when the sandbox itself could not run.
    #[instrument(skip_all, fields(code_len = code.len()))]
    pub async fn run(
        &self,
        code: &str,
        stdin: Option<&[u8]>,
    ) -> Result<ExecutionResult, SupervisorError> {
        self.config.validate()?;
        debug!(state = "created");

        let workspace = Workspace::create(code)
            .await
            .map_err(SupervisorError::Workspace)?;
        let recorder = ActivityRecorder::new();
        let guards = Arc::new(GuardSet::new(
            Arc::new(self.config.policy.clone()),
            recorder.clone(),
        ));

        let channel_path = workspace.channel_path();
        let channel =
            GuardChannel::bind(&channel_path).map_err(|source| SupervisorError::Channel {
                path: channel_path.clone(),
                source,
            })?;
        // dropping the sender also stops the broker
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let mut broker = tokio::spawn(channel.serve(guards.clone(), shutdown_rx));

        let governor = ResourceGovernor::new(self.config.limits.clone());
        let address_space = governor.address_space_limit()?;

        let argv = self.config.interpreter.expand_command(
            &workspace.bootstrap_path().to_string_lossy(),
            &workspace.source_path().to_string_lossy(),
        );
        let started = Instant::now();
        let mut child = ChildProcess::spawn(LaunchSpec {
            argv: &argv,
            env: self.child_env(&workspace),
            cwd: workspace.path(),
            stdin: stdin.map(<[u8]>::to_vec),
            address_space,
        })
        .map_err(|source| SupervisorError::Spawn {
            program: argv.first().cloned().unwrap_or_default(),
            source,
        })?;
        let pid = child.pid();
        debug!(pid, state = "launched");

        debug!(pid, state = "running");
        let raced = tokio::select! {
            biased;

            exceeded = governor.watch(pid, started, &recorder) => Race::Limit(exceeded),
            status = child.wait() => Race::Exited(status),
        };

        let (waited, limit, duration) = match raced {
            Race::Limit(exceeded) => {
                child.kill_group();
                let waited = child.wait().await;
                (waited, Some(exceeded), started.elapsed())
            }
            Race::Exited(waited) => {
                let duration = started.elapsed();
                // stragglers left in the group
                child.kill_group();
                (waited, governor.overdue(duration), duration)
            }
        };

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(BROKER_DRAIN, &mut broker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "guard broker failed"),
            Err(_) => {
                warn!("guard broker did not drain in time");
                broker.abort();
            }
        }

        if let Some(exceeded) = &limit {
            info!(%exceeded, "child killed");
            recorder.record_limit(exceeded.event());
        }

        let (stdout, stderr) = child.collect_output(OUTPUT_DRAIN).await;

        let exit_status = waited.map_err(SupervisorError::Wait)?;
        let (exit_code, signal) = process::exit_parts(exit_status);

        if limit.is_none() && exit_code == Some(GUARD_INSTALL_EXIT_CODE) && !guards.is_installed() {
            return Err(SupervisorError::GuardInstall(stderr.trim().to_string()));
        }

        let status = match &limit {
            Some(exceeded) => ExecutionStatus::from_limit(exceeded.kind),
            None if recorder.has_exception() => ExecutionStatus::CrashedWithException,
            None => ExecutionStatus::Completed,
        };
        debug!(?status, exit_code, signal, state = "finished");

        let report = recorder.summarize();
        debug!(
            activities = report.execution_summary.total_activities,
            state = "report_built"
        );

        Ok(ExecutionResult {
            status,
            limit_exceeded: limit.map(|exceeded| exceeded.kind),
            exit_code,
            signal,
            duration,
            peak_memory_kb: governor.peak_rss_kb(),
            stdout,
            stderr,
            report,
        })
    }

    /// Environment of the child; nothing is inherited from this process
    fn child_env(&self, workspace: &Workspace) -> HashMap<String, String> {
        let interpreter = &self.config.interpreter;
        let mut env = HashMap::from([
            ("PATH".to_string(), interpreter.effective_path()),
            (
                "HOME".to_string(),
                workspace.path().to_string_lossy().into_owned(),
            ),
            ("LANG".to_string(), "C.UTF-8".to_string()),
            ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
        ]);
        env.extend(interpreter.env.clone());
        env.insert(
            CHANNEL_ENV.to_string(),
            workspace.channel_path().to_string_lossy().into_owned(),
        );
        env
    }
}
