use guardbox::activity::Verdict;
use guardbox::config::PolicyConfig;
use guardbox::policy::{OperationKind, REASON_ALLOWLISTED};

use super::{assert_totals_consistent, config_with, decisions, run};

#[tokio::test]
async fn test_blocked_write_touches_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("output.txt");
    let code = format!(
        "try:\n    with open({path:?}, 'w') as f:\n        f.write('data')\nexcept PermissionError as e:\n    print('denied', e.errno)\n",
        path = target.display().to_string()
    );

    let result = run(config_with(PolicyConfig::default()), &code).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert!(result.stdout.contains("denied 13"));
    assert!(!target.exists());
    assert_eq!(
        decisions(&result.report),
        vec![(
            OperationKind::FileWrite,
            target.display().to_string(),
            Verdict::Blocked
        )]
    );
    assert_totals_consistent(&result.report);
}

#[tokio::test]
async fn test_allowlisted_read() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.txt");
    std::fs::write(&input, "payload").unwrap();
    let code = format!(
        "with open({path:?}) as f:\n    print(f.read())\n",
        path = input.display().to_string()
    );

    let policy = PolicyConfig {
        allowed_file_paths: [dir.path().display().to_string()].into(),
        ..PolicyConfig::default()
    };
    let result = run(config_with(policy), &code).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "payload");
    let record = result.report.file_operations.details[0].operation().unwrap();
    assert_eq!(record.kind, OperationKind::FileRead);
    assert_eq!(record.decision, Verdict::Allowed);
    assert_eq!(record.reason, REASON_ALLOWLISTED);
}

#[tokio::test]
async fn test_write_gate_open_allows_write() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let code = format!(
        "with open({path:?}, 'a') as f:\n    f.write('x')\n",
        path = target.display().to_string()
    );

    let policy = PolicyConfig {
        allow_file_write: true,
        ..PolicyConfig::default()
    };
    let result = run(config_with(policy), &code).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "x");
    assert_eq!(result.report.file_operations.allowed, 1);
}

#[tokio::test]
async fn test_read_mode_classification() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("data.bin");
    std::fs::write(&input, b"\x00\x01").unwrap();
    let path = input.display().to_string();
    let code = format!(
        "for mode in ('rb', 'r+b'):\n    try:\n        open({path:?}, mode).close()\n    except PermissionError:\n        print('denied', mode)\n"
    );

    let policy = PolicyConfig {
        allow_file_read: true,
        ..PolicyConfig::default()
    };
    let result = run(config_with(policy), &code).await;

    assert!(result.is_success(), "stderr: {}", result.stderr);
    assert_eq!(result.stdout.trim(), "denied r+b");
    assert_eq!(
        decisions(&result.report),
        vec![
            (OperationKind::FileRead, path.clone(), Verdict::Allowed),
            (OperationKind::FileWrite, path, Verdict::Blocked),
        ]
    );
}
