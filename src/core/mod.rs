//! Core command-execution abstractions: commands, queue, lifecycle and the oracle.

pub mod command;
pub mod error;
pub mod lifecycle;
pub mod oracle;
pub mod queue;

#[cfg(feature = "tokio-runtime")]
pub use command::{AsyncAdapter, AsyncCommand};
pub use command::{Command, CommandOutcome, FnCommand, WorkerContext};
pub use error::{AppResult, OracleError};
pub use lifecycle::{Lifecycle, OracleState};
pub use oracle::{CommitLock, CommitPolicy, Oracle, OracleStats};
pub use queue::WorkQueue;
