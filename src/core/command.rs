//! The command contract consumed by the oracle.
//!
//! A command is an opaque unit of deferred work with two phases:
//!
//! - [`Command::execute`] runs the blocking part on a worker thread and may fail.
//! - [`Command::commit`] delivers the result afterwards, whether or not
//!   `execute` succeeded. It consumes the command, so it runs at most once.
//!
//! Commands that never reach a worker (submitted after `stop`, or still
//! queued when the oracle shuts down) are handed to [`Command::abandon`]
//! instead. The default implementation simply drops them.
//!
//! # Example
//!
//! ```rust,ignore
//! use stone_oracle::core::{CommandOutcome, FnCommand, Oracle};
//!
//! let oracle = Oracle::with_thread_count(2)?;
//! oracle.start()?;
//! oracle.submit(Box::new(FnCommand::new(
//!     "load-series",
//!     |_ctx| fetch_series(),
//!     |outcome| ui_tx.send(outcome).ok(),
//! )));
//! ```

use std::fmt;

use anyhow::anyhow;
use uuid::Uuid;

use super::AppResult;

/// A unit of work executed by an oracle worker.
pub trait Command: Send + 'static {
    /// Run the blocking part of the command on a worker thread.
    ///
    /// An `Err` is not escalated: the worker logs it and still calls
    /// [`Command::commit`]. Commands that need to report the failure must
    /// record it themselves.
    ///
    /// # Errors
    ///
    /// Any error the command wants logged by the worker.
    fn execute(&mut self, ctx: &WorkerContext) -> AppResult<()>;

    /// Deliver the result. Called exactly once, after `execute` returns or fails.
    fn commit(self: Box<Self>);

    /// Dispose of a command that will never be executed.
    fn abandon(self: Box<Self>) {}

    /// Label used in log records.
    fn name(&self) -> &str {
        "command"
    }
}

/// Per-worker state handed to [`Command::execute`].
///
/// Each worker owns exactly one context for its whole life; it is never
/// shared between threads.
pub struct WorkerContext {
    worker_id: usize,
    oracle_id: Uuid,
    #[cfg(feature = "tokio-runtime")]
    runtime: std::cell::OnceCell<tokio::runtime::Runtime>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("oracle_id", &self.oracle_id)
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    /// Create a context. Oracles do this once per worker; tests and
    /// synchronous fallbacks may create one to drive a command by hand.
    #[must_use]
    pub const fn new(worker_id: usize, oracle_id: Uuid) -> Self {
        Self {
            worker_id,
            oracle_id,
            #[cfg(feature = "tokio-runtime")]
            runtime: std::cell::OnceCell::new(),
        }
    }

    /// Index of the worker inside its oracle.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Identifier of the owning oracle.
    #[must_use]
    pub const fn oracle_id(&self) -> Uuid {
        self.oracle_id
    }

    /// Drive a future to completion on this worker's single-threaded runtime.
    ///
    /// The runtime is built on first use and lives as long as the worker.
    ///
    /// # Errors
    ///
    /// Fails if the runtime cannot be created.
    #[cfg(feature = "tokio-runtime")]
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> AppResult<F::Output> {
        if self.runtime.get().is_none() {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| anyhow!("failed to create worker runtime: {e}"))?;
            let _ = self.runtime.set(rt);
        }
        let rt = self
            .runtime
            .get()
            .ok_or_else(|| anyhow!("worker runtime unavailable"))?;
        Ok(rt.block_on(fut))
    }
}

/// How a command ended, as seen by its commit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// `execute` returned `Ok`.
    Succeeded,
    /// `execute` failed or panicked.
    Failed(String),
    /// The command was never executed.
    Abandoned,
}

impl CommandOutcome {
    /// True for [`CommandOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Closure-backed command.
///
/// The commit closure receives the [`CommandOutcome`]; it is also invoked
/// with `Abandoned` if the command never runs.
pub struct FnCommand<E, C>
where
    E: FnOnce(&WorkerContext) -> AppResult<()> + Send + 'static,
    C: FnOnce(CommandOutcome) + Send + 'static,
{
    name: String,
    execute: Option<E>,
    commit: C,
    outcome: Option<CommandOutcome>,
}

impl<E, C> FnCommand<E, C>
where
    E: FnOnce(&WorkerContext) -> AppResult<()> + Send + 'static,
    C: FnOnce(CommandOutcome) + Send + 'static,
{
    /// Build a command from an execute closure and a commit closure.
    pub fn new(name: impl Into<String>, execute: E, commit: C) -> Self {
        Self {
            name: name.into(),
            execute: Some(execute),
            commit,
            outcome: None,
        }
    }
}

impl<E, C> Command for FnCommand<E, C>
where
    E: FnOnce(&WorkerContext) -> AppResult<()> + Send + 'static,
    C: FnOnce(CommandOutcome) + Send + 'static,
{
    fn execute(&mut self, ctx: &WorkerContext) -> AppResult<()> {
        let Some(execute) = self.execute.take() else {
            return Err(anyhow!("command `{}` was already executed", self.name));
        };
        let result = execute(ctx);
        self.outcome = Some(match &result {
            Ok(()) => CommandOutcome::Succeeded,
            Err(e) => CommandOutcome::Failed(format!("{e:#}")),
        });
        result
    }

    fn commit(self: Box<Self>) {
        let this = *self;
        // No outcome means execute panicked before recording one.
        let outcome = this
            .outcome
            .unwrap_or_else(|| CommandOutcome::Failed("execute did not complete".into()));
        (this.commit)(outcome);
    }

    fn abandon(self: Box<Self>) {
        let this = *self;
        (this.commit)(CommandOutcome::Abandoned);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A command whose blocking phase is asynchronous.
///
/// Wrap it in [`AsyncAdapter`] to submit it; the future then runs on the
/// executing worker's own runtime, never on the caller's.
#[cfg(feature = "tokio-runtime")]
#[async_trait::async_trait]
pub trait AsyncCommand: Send + 'static {
    /// Asynchronous counterpart of [`Command::execute`].
    ///
    /// # Errors
    ///
    /// Any error the command wants logged by the worker.
    async fn run(&mut self) -> AppResult<()>;

    /// Deliver the result. Called exactly once after `run` finishes.
    fn commit(self: Box<Self>);

    /// Dispose of a command that will never be executed.
    fn abandon(self: Box<Self>) {}

    /// Label used in log records.
    fn name(&self) -> &str {
        "async-command"
    }
}

/// Adapts an [`AsyncCommand`] to the [`Command`] contract.
#[cfg(feature = "tokio-runtime")]
pub struct AsyncAdapter<C: AsyncCommand> {
    inner: Box<C>,
}

#[cfg(feature = "tokio-runtime")]
impl<C: AsyncCommand> AsyncAdapter<C> {
    /// Wrap an asynchronous command.
    pub fn new(inner: C) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl<C: AsyncCommand> Command for AsyncAdapter<C> {
    fn execute(&mut self, ctx: &WorkerContext) -> AppResult<()> {
        ctx.block_on(self.inner.run())?
    }

    fn commit(self: Box<Self>) {
        let this = *self;
        this.inner.commit();
    }

    fn abandon(self: Box<Self>) {
        let this = *self;
        this.inner.abandon();
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
