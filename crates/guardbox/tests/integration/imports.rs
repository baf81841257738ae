use guardbox::activity::Verdict;
use guardbox::config::{EnforcementMode, PolicyConfig};
use guardbox::policy::{OperationKind, REASON_ALLOWLISTED, REASON_RESTRICTED};
use guardbox::types::ExecutionStatus;
use guardbox::Supervisor;

use super::{assert_totals_consistent, config_with, decisions, fixture_script, run};

#[tokio::test]
async fn test_safe_script_succeeds() {
    let result = run(config_with(PolicyConfig::default()), &fixture_script("safe.py")).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("Sum of 1 to 100: 5050"));
    assert!(result.stdout.contains("Safe script completed successfully!"));
    assert_eq!(result.report.blocked_total(), 0);
    // imports made inside the standard library are not user activity
    let targets: Vec<_> = decisions(&result.report)
        .into_iter()
        .map(|(_, target, _)| target)
        .collect();
    assert_eq!(targets, vec!["math", "random"]);
    assert_totals_consistent(&result.report);
}

#[tokio::test]
async fn test_restricted_import_is_blocked_once() {
    let result = run(
        config_with(PolicyConfig::default()),
        &fixture_script("restricted_import.py"),
    )
    .await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("blocked: import of 'subprocess' blocked"));
    assert!(result.stdout.contains("continuing after blocked import"));

    let imports = &result.report.imports;
    assert_eq!(imports.total, 1);
    assert_eq!(imports.blocked, 1);
    let record = imports.details[0].operation().unwrap();
    assert_eq!(record.target, "subprocess");
    assert_eq!(record.reason, REASON_RESTRICTED);
    assert_totals_consistent(&result.report);
}

#[tokio::test]
async fn test_uncaught_blocked_import_crashes() {
    let result = run(config_with(PolicyConfig::default()), "import subprocess\n").await;

    assert_eq!(result.status, ExecutionStatus::CrashedWithException);
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.report.imports.blocked, 1);
    assert_eq!(result.report.exceptions.total, 1);
    assert!(result.stderr.contains("ImportError"));
}

#[tokio::test]
async fn test_allowlist_beats_restriction() {
    let policy = PolicyConfig {
        restricted_imports: ["os".to_string()].into(),
        allowed_imports: ["os".to_string()].into(),
        ..PolicyConfig::empty()
    };
    let result = run(config_with(policy), &fixture_script("import_os.py")).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("cwd is set: True"));
    let ops = decisions(&result.report);
    assert_eq!(
        ops,
        vec![(OperationKind::Import, "os".to_string(), Verdict::Allowed)]
    );
    let record = result.report.imports.details[0].operation().unwrap();
    assert_eq!(record.reason, REASON_ALLOWLISTED);
}

#[tokio::test]
async fn test_dotted_import_is_matched_exactly() {
    let policy = PolicyConfig {
        restricted_imports: ["os".to_string()].into(),
        ..PolicyConfig::empty()
    };
    let result = run(config_with(policy), "import os.path\nprint(os.sep)\n").await;

    // `os.path` is not `os`, so the import goes through and binds `os`
    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "/");
    assert_eq!(
        decisions(&result.report),
        vec![(OperationKind::Import, "os.path".to_string(), Verdict::Allowed)]
    );

    let policy = PolicyConfig {
        restricted_imports: ["os".to_string(), "os.path".to_string()].into(),
        ..PolicyConfig::empty()
    };
    let result = run(config_with(policy), "import os.path\n").await;
    assert_eq!(result.status, ExecutionStatus::CrashedWithException);
    assert_eq!(result.report.imports.blocked, 1);
}

#[tokio::test]
async fn test_each_import_attempt_is_recorded() {
    let result = run(
        config_with(PolicyConfig::empty()),
        &fixture_script("repeated_import.py"),
    )
    .await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.report.imports.total, 3);
    assert_eq!(result.report.imports.allowed, 3);
}

#[tokio::test]
async fn test_audit_mode_warns_and_proceeds() {
    let policy = PolicyConfig {
        mode: EnforcementMode::Audit,
        ..PolicyConfig::default()
    };
    let result = run(config_with(policy), &fixture_script("import_os.py")).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("cwd is set: True"));
    assert!(result.stderr.contains("WARNING: import 'os'"));
    assert_eq!(result.report.imports.blocked, 1);
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let supervisor = Supervisor::new(config_with(PolicyConfig::default()));
    let code = fixture_script("restricted_import.py");

    let first = supervisor.run(&code, None).await.unwrap();
    let second = supervisor.run(&code, None).await.unwrap();

    assert_eq!(decisions(&first.report), decisions(&second.report));
    assert_eq!(first.report.imports.total, second.report.imports.total);
    assert_eq!(first.report.imports.blocked, second.report.imports.blocked);
}

#[tokio::test]
async fn test_stdin_is_forwarded() {
    let result = Supervisor::new(config_with(PolicyConfig::default()))
        .run(&fixture_script("echo_stdin.py"), Some(b"World\n"))
        .await
        .unwrap();

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "Hello, World!");
}
