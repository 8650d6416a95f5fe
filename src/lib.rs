//! # Stone Oracle
//!
//! An asynchronous command execution engine: a fixed pool of worker threads
//! that runs submitted commands off the calling thread and hands their
//! results back through a commit step.
//!
//! ## Core Problem Solved
//!
//! Viewer-style applications issue many blocking operations (HTTP requests to
//! an image archive, file parsing, decoding) from a thread that must stay
//! responsive. The oracle moves the blocking part onto workers and keeps the
//! delivery of results separate, so that it can be synchronized with the
//! application's own state.
//!
//! ## Key Features
//!
//! - **Two-phase commands**: `execute` does the blocking work and may fail;
//!   `commit` always follows and reports success or failure exactly once
//! - **Explicit lifecycle**: `Init -> Started -> Stopped`, with misuse reported
//!   as sequencing errors instead of corrupting the engine
//! - **Failure isolation**: errors and panics inside a command never take a
//!   worker down
//! - **Serialized commits**: optionally run every commit under an
//!   application-owned lock
//! - **Web service adapter**: HTTP requests as commands with success and
//!   failure callbacks
//!
//! ## Example
//!
//! ```rust,ignore
//! use stone_oracle::config::OracleConfig;
//! use stone_oracle::core::{CommandOutcome, FnCommand, Oracle};
//!
//! let oracle = Oracle::new(OracleConfig::new().with_thread_count(4))?;
//! oracle.start()?;
//!
//! let (tx, rx) = flume::unbounded();
//! oracle.submit(Box::new(FnCommand::new(
//!     "fetch-instance",
//!     |_ctx| download_instance(),
//!     move |outcome: CommandOutcome| {
//!         let _ = tx.send(outcome);
//!     },
//! )));
//!
//! // The UI loop receives committed outcomes.
//! let outcome = rx.recv()?;
//! oracle.stop()?;
//! ```
//!
//! For complete examples, see `tests/oracle_test.rs` and
//! `tests/web_service_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core command-execution abstractions and the oracle engine.
pub mod core;
/// Configuration models for oracles and oracle sets.
pub mod config;
/// Builders to construct oracles from configuration.
pub mod builders;
/// Runtime adapters built on the oracle, such as the web service.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::core::{Command, CommandOutcome, FnCommand, Oracle, OracleError, OracleState};
