//! Child process spawning and I/O
//!
//! The child runs in its own process group so a kill reaches anything it
//! forked. Output is drained concurrently by background tasks into shared,
//! capped buffers, so whatever was read survives a reader that never sees EOF.

use std::collections::HashMap;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, trace, warn};

use crate::governor::apply_rlimits;

/// Bytes kept per output stream; anything beyond is discarded
pub const MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// What to launch
#[derive(Debug)]
pub struct LaunchSpec<'a> {
    /// Program followed by its arguments
    pub argv: &'a [String],
    /// Complete environment of the child
    pub env: HashMap<String, String>,
    pub cwd: &'a Path,
    pub stdin: Option<Vec<u8>>,
    /// RLIMIT_AS applied before exec
    pub address_space: Option<u64>,
}

/// A running child with its output readers
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: u32,
    stdout: Option<OutputReader>,
    stderr: Option<OutputReader>,
}

impl ChildProcess {
    /// Spawn the child and start draining its output
    #[instrument(skip(spec), fields(program = ?spec.argv.first()))]
    pub fn spawn(spec: LaunchSpec<'_>) -> io::Result<Self> {
        let (program, args) = spec.argv.split_first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "empty command arguments")
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .envs(&spec.env)
            .current_dir(spec.cwd)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let address_space = spec.address_space;
        // SAFETY: the hook only calls setrlimit, which is async-signal-safe
        unsafe {
            command.pre_exec(move || apply_rlimits(address_space));
        }

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("child exited before its pid was read"))?;
        debug!(pid, "child spawned");

        if let (Some(mut pipe), Some(data)) = (child.stdin.take(), spec.stdin) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&data).await {
                    debug!(error = %e, "stdin write stopped");
                }
                // dropping the pipe closes stdin
            });
        }

        let stdout = child.stdout.take().map(OutputReader::spawn);
        let stderr = child.stderr.take().map(OutputReader::spawn);

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Wait for the child to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// SIGKILL the child's whole process group
    ///
    /// A group that is already gone is not an error.
    pub fn kill_group(&mut self) {
        let Ok(raw) = i32::try_from(self.pid) else {
            return;
        };
        match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => trace!(pid = self.pid, "process group killed"),
            Err(Errno::ESRCH) => {}
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to kill process group");
                if let Err(e) = self.child.start_kill() {
                    debug!(error = %e, "direct kill failed");
                }
            }
        }
    }

    /// Collect captured stdout and stderr
    ///
    /// Readers normally finish once every process holding the pipes has
    /// exited. A descendant that escaped the process group can keep them
    /// open; after `drain` the readers are abandoned and the bytes read so
    /// far are returned.
    pub async fn collect_output(&mut self, drain: Duration) -> (String, String) {
        let deadline = Instant::now() + drain;
        let stdout = finish_reader(self.stdout.take(), deadline).await;
        let stderr = finish_reader(self.stderr.take(), deadline).await;
        (
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }
}

/// Exit code and terminating signal of a finished child
pub fn exit_parts(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), status.signal())
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

fn lock(buffer: &SharedBuffer) -> MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Background task draining one output pipe
#[derive(Debug)]
struct OutputReader {
    buffer: SharedBuffer,
    task: JoinHandle<()>,
}

impl OutputReader {
    fn spawn<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = SharedBuffer::default();
        let task = tokio::spawn(read_capped(reader, buffer.clone()));
        Self { buffer, task }
    }

    /// Wait for EOF until `deadline`, then hand back what was read
    async fn finish(self, deadline: Instant) -> Vec<u8> {
        let Self { buffer, mut task } = self;
        match timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "output reader task failed"),
            Err(_) => {
                warn!("output pipe still held open, keeping partial output");
                task.abort();
            }
        }
        std::mem::take(&mut *lock(&buffer))
    }
}

async fn finish_reader(reader: Option<OutputReader>, deadline: Instant) -> Vec<u8> {
    match reader {
        Some(reader) => reader.finish(deadline).await,
        None => Vec::new(),
    }
}

async fn read_capped<R>(mut reader: R, buffer: SharedBuffer)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    let mut dropped = 0usize;
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                debug!(error = %e, "output read failed");
                break;
            }
        };
        // past the cap, keep draining so the child never blocks on a full pipe
        let mut buf = lock(&buffer);
        let keep = read.min(MAX_OUTPUT_BYTES.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        dropped += read - keep;
    }
    if dropped > 0 {
        debug!(dropped, "output truncated");
    }
}
