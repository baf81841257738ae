use std::time::{Duration, Instant};

use guardbox::activity::ActivityEntry;
use guardbox::config::PolicyConfig;
use guardbox::types::{ExecutionStatus, LimitKind, ResourceLimits};

use super::{assert_totals_consistent, config_with, fixture_script, run};

fn limit_kinds(result: &guardbox::ExecutionResult) -> Vec<LimitKind> {
    result
        .report
        .resource_limits
        .details
        .iter()
        .filter_map(|activity| match &activity.entry {
            ActivityEntry::ResourceLimit(event) => Some(event.kind),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_timeout_kills_and_keeps_partial_log() {
    let config = config_with(PolicyConfig::default())
        .with_limits(ResourceLimits::new().with_timeout(1.0));
    let started = Instant::now();
    let result = run(config, &fixture_script("sleep_forever.py")).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.status, ExecutionStatus::TimedOut);
    assert_eq!(result.limit_exceeded, Some(LimitKind::Timeout));
    assert_eq!(limit_kinds(&result), vec![LimitKind::Timeout]);
    assert!(result.stdout.contains("started"));
    assert!(!result.stdout.contains("unreachable"));
    // the import before the sleep was flushed before the kill
    assert_eq!(result.report.imports.total, 1);
    assert_totals_consistent(&result.report);
}

#[tokio::test]
async fn test_memory_watchdog_terminates() {
    let mut limits = ResourceLimits::new().with_memory_limit_mb(64);
    limits.address_space_limit = false;
    let config = config_with(PolicyConfig::default()).with_limits(limits);
    let result = run(config, &fixture_script("memory_hog.py")).await;

    assert_eq!(result.status, ExecutionStatus::Terminated);
    assert_eq!(result.limit_exceeded, Some(LimitKind::Memory));
    assert_eq!(limit_kinds(&result), vec![LimitKind::Memory]);
    assert!(result.peak_memory_kb.unwrap() > 64 * 1024);
}

#[tokio::test]
async fn test_address_space_limit_fails_allocation() {
    let config = config_with(PolicyConfig::default())
        .with_limits(ResourceLimits::new().with_memory_limit_mb(512));
    let result = run(config, &fixture_script("big_allocation.py")).await;

    assert_eq!(result.status, ExecutionStatus::CrashedWithException);
    assert!(result.stderr.contains("MemoryError"));
}

#[tokio::test]
async fn test_cpu_limit_is_advisory_by_default() {
    let config = config_with(PolicyConfig::default())
        .with_limits(ResourceLimits::new().with_cpu_limit_percent(10.0));
    let result = run(config, &fixture_script("busy_loop.py")).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("done spinning"));
    assert_eq!(result.limit_exceeded, None);
    assert_eq!(limit_kinds(&result), vec![LimitKind::Cpu]);
}

#[tokio::test]
async fn test_enforced_cpu_limit_terminates() {
    let limits = ResourceLimits::new()
        .with_cpu_limit_percent(10.0)
        .with_enforced_cpu_limit(true);
    let config = config_with(PolicyConfig::default()).with_limits(limits);
    let result = run(config, &fixture_script("busy_loop.py")).await;

    assert_eq!(result.status, ExecutionStatus::Terminated);
    assert_eq!(result.limit_exceeded, Some(LimitKind::Cpu));
    assert!(!result.stdout.contains("done spinning"));
}

#[tokio::test]
async fn test_peak_memory_is_reported() {
    let result = run(
        config_with(PolicyConfig::default()),
        &fixture_script("busy_loop.py"),
    )
    .await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.peak_memory_kb.is_some());
}
