use guardbox::config::{Config, ConfigError, EnforcementMode};

use super::FIXTURES_PATH;

#[test]
fn test_load_valid_config() {
    let path = format!("{}/configs/valid_full.toml", FIXTURES_PATH);
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.limits.timeout_seconds, 5.0);
    assert_eq!(config.limits.memory_limit_mb, 256);
    assert_eq!(config.limits.poll_interval_ms, 25);
    assert!(!config.limits.address_space_limit);
    assert!(config.policy.allow_file_read);
    assert!(config.policy.restricted_imports.contains("socket"));
    assert!(config.policy.allowed_imports.contains("socket"));
    assert!(config.policy.allowed_file_paths.contains("/tmp/guardbox-data"));
    assert_eq!(config.policy.allowed_network_addresses.len(), 2);
}

#[test]
fn test_load_minimal_config() {
    let path = format!("{}/configs/valid_minimal.toml", FIXTURES_PATH);
    let config = Config::from_file(&path).expect("Failed to load config");

    assert_eq!(config.limits.timeout_seconds, 3.0);
    assert_eq!(config.limits.memory_limit_mb, 128);
    assert!(config.policy.restricted_imports.contains("subprocess"));
    assert_eq!(config.policy.mode, EnforcementMode::Enforce);
}

#[test]
fn test_load_audit_mode() {
    let path = format!("{}/configs/audit_mode.toml", FIXTURES_PATH);
    let config = Config::from_file(&path).expect("Failed to load config");
    assert_eq!(config.policy.mode, EnforcementMode::Audit);
    assert!(!config.policy.enforces());
}

#[test]
fn test_load_invalid_timeout() {
    let path = format!("{}/configs/invalid_timeout.toml", FIXTURES_PATH);
    let result = Config::from_file(&path);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_cpu() {
    let path = format!("{}/configs/invalid_cpu.toml", FIXTURES_PATH);
    let result = Config::from_file(&path);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_command() {
    let path = format!("{}/configs/invalid_command.toml", FIXTURES_PATH);
    let result = Config::from_file(&path);
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_mode() {
    let path = format!("{}/configs/invalid_mode.toml", FIXTURES_PATH);
    let result = Config::from_file(&path);
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_nonexistent_file() {
    let result = Config::from_file("/nonexistent/path/guardbox.toml");
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}
