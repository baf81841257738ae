//! Integration tests for guardbox
//!
//! These tests launch a real python3 (3.10 or newer) found on PATH.
//! Run with: cargo test -p guardbox --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;

use guardbox::activity::Verdict;
use guardbox::config::{Config, PolicyConfig};
use guardbox::policy::OperationKind;
use guardbox::types::ExecutionResult;
use guardbox::{Report, Supervisor};

mod config_loading;
mod exceptions;
mod file_access;
mod imports;
mod resource_limits;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture script content
pub(crate) fn fixture_script(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/scripts/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Config with the given policy and default limits
pub(crate) fn config_with(policy: PolicyConfig) -> Config {
    Config::default().with_policy(policy)
}

/// Run code and fail the test on infrastructure errors
pub(crate) async fn run(config: Config, code: &str) -> ExecutionResult {
    Supervisor::new(config)
        .run(code, None)
        .await
        .expect("sandbox failed to run")
}

/// (kind, target, decision) of every operation, in order
pub(crate) fn decisions(report: &Report) -> Vec<(OperationKind, String, Verdict)> {
    report
        .all_activities
        .iter()
        .filter_map(|activity| activity.operation())
        .map(|record| (record.kind, record.target.clone(), record.decision))
        .collect()
}

/// Every category must account for each entry exactly once
pub(crate) fn assert_totals_consistent(report: &Report) {
    for summary in [
        &report.imports,
        &report.file_operations,
        &report.network_operations,
    ] {
        assert_eq!(summary.allowed + summary.blocked, summary.total);
        assert_eq!(summary.details.len(), summary.total);
    }
    assert_eq!(
        report.all_activities.len(),
        report.execution_summary.total_activities
    );
}
