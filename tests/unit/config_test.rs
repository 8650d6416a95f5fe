//! Tests for configuration validation

use stone_oracle::config::{OracleConfig, OracleSetConfig, ShutdownPolicy};

#[test]
fn test_oracle_config_validation() {
    let valid = OracleConfig::new().with_thread_count(4);
    assert!(valid.validate().is_ok());
}

#[test]
fn test_oracle_config_invalid_thread_count() {
    let invalid = OracleConfig::new().with_thread_count(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_oracle_config_invalid_timeout() {
    let invalid = OracleConfig::new().with_dequeue_timeout_ms(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_oracle_config_from_json() {
    let json = r#"{
        "thread_count": 4,
        "dequeue_timeout_ms": 50,
        "wait_empty_poll_ms": 5,
        "thread_stack_size": 1048576,
        "thread_name_prefix": "loader",
        "shutdown_policy": "abandon"
    }"#;

    let config = OracleConfig::from_json_str(json).unwrap();
    assert_eq!(config.thread_count, 4);
    assert_eq!(config.dequeue_timeout_ms, 50);
    assert_eq!(config.thread_stack_size, Some(1_048_576));
    assert_eq!(config.shutdown_policy, ShutdownPolicy::Abandon);
}

#[test]
fn test_oracle_config_from_malformed_json() {
    let err = OracleConfig::from_json_str("{ thread_count: ").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_oracle_set_config_validation() {
    let mut oracles = std::collections::HashMap::new();
    oracles.insert("network".to_string(), OracleConfig::new().with_thread_count(4));

    let config = OracleSetConfig { oracles };
    assert!(config.validate().is_ok());
}

#[test]
fn test_oracle_set_config_empty() {
    let config = OracleSetConfig::default();
    assert!(config.validate().is_err());
}

#[test]
fn test_oracle_set_config_reports_bad_member() {
    let json = r#"{
        "oracles": {
            "network": { "thread_count": 4 },
            "parsing": { "thread_count": 0 }
        }
    }"#;

    let err = OracleSetConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("oracle `parsing` invalid"));
}

#[test]
fn test_oracle_config_from_env() {
    // Only this test touches ORACLE_* variables.
    std::env::set_var("ORACLE_THREAD_COUNT", "3");
    std::env::set_var("ORACLE_DEQUEUE_TIMEOUT_MS", "25");
    let config = OracleConfig::from_env().unwrap();
    assert_eq!(config.thread_count, 3);
    assert_eq!(config.dequeue_timeout_ms, 25);

    std::env::set_var("ORACLE_THREAD_COUNT", "many");
    let err = OracleConfig::from_env().unwrap_err();
    assert!(err.contains("ORACLE_THREAD_COUNT"));

    std::env::remove_var("ORACLE_THREAD_COUNT");
    std::env::remove_var("ORACLE_DEQUEUE_TIMEOUT_MS");
}
