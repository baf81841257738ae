//! Sampling a live process through /proc

use std::path::Path;

/// Kernel clock ticks per second as reported in /proc/<pid>/stat
pub const USER_HZ: u64 = 100;

/// One observation of a running process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcSample {
    /// Resident set size in kilobytes
    pub rss_kb: Option<u64>,
    /// User plus system CPU time in clock ticks
    pub cpu_ticks: Option<u64>,
}

/// Whether /proc is mounted and readable
pub fn available() -> bool {
    Path::new("/proc/self/stat").exists()
}

/// Extract `VmRSS` in kilobytes from the contents of /proc/<pid>/status
pub fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("VmRSS:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}

/// Extract `utime + stime` from the contents of /proc/<pid>/stat
///
/// The command name may contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub fn parse_cpu_ticks(stat: &str) -> Option<u64> {
    let (_, rest) = stat.rsplit_once(')')?;
    let mut fields = rest.split_whitespace();
    // after the comm field: state(0) ... utime(11) stime(12)
    let utime: u64 = fields.nth(11)?.parse().ok()?;
    let stime: u64 = fields.next()?.parse().ok()?;
    utime.checked_add(stime)
}

/// Read memory and CPU counters for `pid`
pub async fn sample(pid: u32) -> std::io::Result<ProcSample> {
    let base = Path::new("/proc").join(pid.to_string());
    let status = tokio::fs::read_to_string(base.join("status")).await?;
    let stat = tokio::fs::read_to_string(base.join("stat")).await?;
    Ok(ProcSample {
        rss_kb: parse_vm_rss_kb(&status),
        cpu_ticks: parse_cpu_ticks(&stat),
    })
}
