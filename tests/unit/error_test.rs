//! Tests for error types

use stone_oracle::core::{OracleError, OracleState};

#[test]
fn test_bad_sequence_error() {
    let err = OracleError::BadSequence {
        operation: "stop",
        state: OracleState::Init,
    };
    assert_eq!(
        format!("{}", err),
        "bad sequence of calls: cannot stop an oracle in state init"
    );
}

#[test]
fn test_invalid_config_error() {
    let err = OracleError::InvalidConfig("thread_count must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: thread_count must be greater than 0"
    );
}

#[test]
fn test_worker_panicked_error() {
    let err = OracleError::WorkerPanicked { count: 2 };
    assert_eq!(format!("{}", err), "2 worker thread(s) panicked");
}

#[test]
fn test_errors_convert_into_anyhow() {
    let err: anyhow::Error = OracleError::WorkerPanicked { count: 1 }.into();
    assert!(err.downcast_ref::<OracleError>().is_some());
}
