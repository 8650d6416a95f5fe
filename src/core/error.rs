//! Error types for oracle operations.

use thiserror::Error;

use super::lifecycle::OracleState;

/// Errors produced by the oracle engine.
///
/// Only misuse of the engine itself surfaces here. Failures of an individual
/// command stay inside that command and are reported through its `commit`.
#[derive(Debug, Error)]
pub enum OracleError {
    /// A lifecycle operation was called in the wrong state.
    #[error("bad sequence of calls: cannot {operation} an oracle in state {state}")]
    BadSequence {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the oracle was in.
        state: OracleState,
    },
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread {worker_id}: {source}")]
    Spawn {
        /// Index of the worker that failed to start.
        worker_id: usize,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
    /// One or more worker threads panicked outside of command code.
    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked {
        /// Number of workers whose join reported a panic.
        count: usize,
    },
}

/// Application-facing result using anyhow for command-level failures.
pub type AppResult<T> = Result<T, anyhow::Error>;
