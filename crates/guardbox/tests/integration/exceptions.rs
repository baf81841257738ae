use guardbox::activity::ActivityEntry;
use guardbox::config::PolicyConfig;
use guardbox::types::ExecutionStatus;

use super::{config_with, fixture_script, run};

#[tokio::test]
async fn test_unhandled_exception_is_reported() {
    let result = run(
        config_with(PolicyConfig::default()),
        &fixture_script("divide_by_zero.py"),
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::CrashedWithException);
    assert_eq!(result.exit_code, Some(1));
    assert!(!result.is_success());
    assert!(result.stdout.contains("before crash"));
    assert!(result.stderr.contains("ZeroDivisionError"));

    let exceptions = &result.report.exceptions;
    assert_eq!(exceptions.total, 1);
    match &exceptions.details[0].entry {
        ActivityEntry::Exception(record) => {
            assert_eq!(record.exception_type, "ZeroDivisionError");
            assert_eq!(record.message, "division by zero");
            assert!(record.traceback.contains("compute"));
        }
        other => panic!("expected exception entry, got {other:?}"),
    }
}

#[tokio::test]
async fn test_syntax_error_is_reported() {
    let result = run(
        config_with(PolicyConfig::default()),
        &fixture_script("syntax_error.py"),
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::CrashedWithException);
    assert!(matches!(
        &result.report.exceptions.details[0].entry,
        ActivityEntry::Exception(record) if record.exception_type == "SyntaxError"
    ));
}

#[tokio::test]
async fn test_system_exit_is_not_an_exception() {
    let result = run(
        config_with(PolicyConfig::default()),
        &fixture_script("exit_code.py"),
    )
    .await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.exit_code, Some(3));
    assert!(!result.is_success());
    assert_eq!(result.report.exceptions.total, 0);
    assert_eq!(result.termination_reason(), "exited with code 3");
}
