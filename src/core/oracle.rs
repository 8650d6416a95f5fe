//! The oracle: a fixed pool of worker threads executing submitted commands.
//!
//! Applications hold an [`Oracle`], call [`Oracle::start`] once, submit
//! commands from any thread, and call [`Oracle::stop`] once before dropping it.
//!
//! # Lifecycle
//!
//! - `Init`: submissions are queued; nothing runs.
//! - `Started`: workers dequeue and run commands.
//! - `Stopped`: workers have exited; submissions are abandoned and logged.
//!
//! # Shutdown
//!
//! `stop` flips the state, joins every worker and then disposes of whatever
//! is still queued through [`Command::abandon`]. A command that was already
//! dequeued when `stop` was called always finishes its execute/commit pair.
//!
//! # Example
//!
//! ```rust,ignore
//! use stone_oracle::config::OracleConfig;
//! use stone_oracle::core::Oracle;
//!
//! let oracle = Oracle::new(OracleConfig::new().with_thread_count(4))?;
//! oracle.start()?;
//! oracle.submit(Box::new(my_command));
//! oracle.wait_empty();
//! oracle.stop()?;
//! ```

mod worker;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{OracleConfig, ShutdownPolicy};

use super::{Command, Lifecycle, OracleError, OracleState, WorkQueue};

/// Lock shared between an oracle and the application state its commits touch.
pub type CommitLock = Arc<Mutex<()>>;

/// Where `commit` runs relative to other commits.
#[derive(Debug, Clone, Default)]
pub enum CommitPolicy {
    /// Commits run directly on the worker, possibly in parallel.
    #[default]
    Concurrent,
    /// Every commit runs while holding the given lock.
    Serialized(CommitLock),
}

/// Snapshot of oracle activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleStats {
    /// Configured number of worker threads.
    pub worker_count: usize,
    /// Workers currently inside their loop.
    pub running_workers: usize,
    /// Workers joined by `stop`.
    pub joined_workers: usize,
    /// Commands currently between dequeue and the end of commit.
    pub active_commands: u64,
    /// Commands waiting in the queue.
    pub queued_commands: u64,
    /// Commands accepted by `submit`.
    pub submitted_commands: u64,
    /// Commands refused by `submit` because the oracle was stopped.
    pub rejected_commands: u64,
    /// Executions that returned `Ok`.
    pub succeeded_commands: u64,
    /// Executions that returned `Err` or panicked.
    pub failed_commands: u64,
    /// Commits that ran.
    pub committed_commands: u64,
    /// Commands disposed of without running.
    pub abandoned_commands: u64,
}

#[derive(Debug, Default)]
pub(crate) struct OracleCounters {
    pub running_workers: AtomicUsize,
    pub joined_workers: AtomicUsize,
    pub active_commands: AtomicU64,
    pub submitted_commands: AtomicU64,
    pub rejected_commands: AtomicU64,
    pub succeeded_commands: AtomicU64,
    pub failed_commands: AtomicU64,
    pub committed_commands: AtomicU64,
    pub abandoned_commands: AtomicU64,
}

impl OracleCounters {
    fn snapshot(&self, worker_count: usize, queued: usize) -> OracleStats {
        OracleStats {
            worker_count,
            running_workers: self.running_workers.load(Ordering::Relaxed),
            joined_workers: self.joined_workers.load(Ordering::Relaxed),
            active_commands: self.active_commands.load(Ordering::Relaxed),
            queued_commands: queued as u64,
            submitted_commands: self.submitted_commands.load(Ordering::Relaxed),
            rejected_commands: self.rejected_commands.load(Ordering::Relaxed),
            succeeded_commands: self.succeeded_commands.load(Ordering::Relaxed),
            failed_commands: self.failed_commands.load(Ordering::Relaxed),
            committed_commands: self.committed_commands.load(Ordering::Relaxed),
            abandoned_commands: self.abandoned_commands.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the facade and its workers.
pub(crate) struct Shared {
    pub id: Uuid,
    pub lifecycle: Lifecycle,
    pub queue: WorkQueue,
    pub counters: OracleCounters,
    pub commit_policy: CommitPolicy,
    pub dequeue_timeout: Duration,
}

/// Asynchronous command execution engine.
pub struct Oracle {
    config: OracleConfig,
    shared: Arc<Shared>,
    /// Also serializes `start` against `stop`.
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracle")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("thread_count", &self.config.thread_count)
            .finish_non_exhaustive()
    }
}

impl Oracle {
    /// Create an oracle in the `Init` state. No thread is started.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::InvalidConfig` if the configuration is invalid.
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        Self::with_commit_policy(config, CommitPolicy::Concurrent)
    }

    /// Create an oracle with default settings and `thread_count` workers.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::InvalidConfig` if `thread_count` is zero.
    pub fn with_thread_count(thread_count: usize) -> Result<Self, OracleError> {
        Self::new(OracleConfig::new().with_thread_count(thread_count))
    }

    /// Create an oracle whose commits follow `policy`.
    ///
    /// # Errors
    ///
    /// Returns `OracleError::InvalidConfig` if the configuration is invalid.
    pub fn with_commit_policy(
        config: OracleConfig,
        policy: CommitPolicy,
    ) -> Result<Self, OracleError> {
        config.validate().map_err(OracleError::InvalidConfig)?;

        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            lifecycle: Lifecycle::new(),
            queue: WorkQueue::new(),
            counters: OracleCounters::default(),
            commit_policy: policy,
            dequeue_timeout: config.dequeue_timeout(),
        });

        debug!(
            oracle_id = %shared.id,
            thread_count = config.thread_count,
            "Oracle created"
        );

        Ok(Self {
            config,
            shared,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Unique identifier of this oracle, used in log records.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Configured number of worker threads.
    #[must_use]
    pub const fn thread_count(&self) -> usize {
        self.config.thread_count
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> OracleState {
        self.shared.lifecycle.current()
    }

    /// Spawn the worker threads and move to `Started`.
    ///
    /// # Errors
    ///
    /// - `OracleError::BadSequence` if the oracle was already started or stopped;
    ///   the state is left unchanged.
    /// - `OracleError::Spawn` if a worker cannot be created. The workers that
    ///   did start are joined and the oracle ends up `Stopped`.
    pub fn start(&self) -> Result<(), OracleError> {
        let mut workers = self.workers.lock();

        if !self
            .shared
            .lifecycle
            .try_transition(OracleState::Init, OracleState::Started)
        {
            let state = self.state();
            error!(oracle_id = %self.shared.id, %state, "Oracle already started or stopped");
            return Err(OracleError::BadSequence {
                operation: "start",
                state,
            });
        }

        for worker_id in 0..self.config.thread_count {
            match worker::spawn_worker(worker_id, Arc::clone(&self.shared), &self.config) {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    error!(
                        oracle_id = %self.shared.id,
                        worker_id,
                        error = %source,
                        "Failed to spawn worker thread, stopping partially started oracle"
                    );
                    self.shared
                        .lifecycle
                        .try_transition(OracleState::Started, OracleState::Stopped);
                    self.join_all(&mut workers);
                    self.dispose_queued();
                    return Err(OracleError::Spawn { worker_id, source });
                }
            }
        }

        info!(
            oracle_id = %self.shared.id,
            thread_count = self.config.thread_count,
            "Oracle started"
        );
        Ok(())
    }

    /// Hand a command to the oracle. Never blocks and never fails.
    ///
    /// In `Init` or `Started` the command is queued. In `Stopped` it is logged
    /// and passed to [`Command::abandon`] on the calling thread.
    pub fn submit(&self, command: Box<dyn Command>) {
        let shared = &self.shared;
        let rejected = shared.lifecycle.with_state(move |state| match state {
            OracleState::Init | OracleState::Started => {
                shared.counters.submitted_commands.fetch_add(1, Ordering::Relaxed);
                shared.queue.enqueue(command);
                None
            }
            OracleState::Stopped => Some(command),
        });

        if let Some(command) = rejected {
            error!(
                oracle_id = %shared.id,
                command = command.name(),
                "Cannot submit a command after the oracle has been stopped"
            );
            shared.counters.rejected_commands.fetch_add(1, Ordering::Relaxed);
            self.abandon(command);
        }
    }

    /// Stop the workers, join them, and dispose of queued commands.
    ///
    /// Workers observe the new state within one dequeue timeout. Once this
    /// returns no worker thread is running, except the calling one when
    /// `stop` is invoked from inside a command.
    ///
    /// # Errors
    ///
    /// - `OracleError::BadSequence` if the oracle is not `Started`; the state is
    ///   left unchanged.
    /// - `OracleError::WorkerPanicked` if a worker thread died; every other
    ///   worker has still been joined.
    pub fn stop(&self) -> Result<(), OracleError> {
        let mut workers = self.workers.lock();

        if !self
            .shared
            .lifecycle
            .try_transition(OracleState::Started, OracleState::Stopped)
        {
            let state = self.state();
            error!(oracle_id = %self.shared.id, %state, "Oracle is not started");
            return Err(OracleError::BadSequence {
                operation: "stop",
                state,
            });
        }

        info!(oracle_id = %self.shared.id, "Stopping oracle");

        let panicked = self.join_all(&mut workers);
        let abandoned = self.dispose_queued();

        info!(
            oracle_id = %self.shared.id,
            joined = self.shared.counters.joined_workers.load(Ordering::Relaxed),
            abandoned,
            "Oracle stopped"
        );

        if panicked > 0 {
            return Err(OracleError::WorkerPanicked { count: panicked });
        }
        Ok(())
    }

    /// Block until the queue has been observed empty.
    ///
    /// Commands already picked up by a worker may still be running.
    pub fn wait_empty(&self) {
        self.shared.queue.wait_empty(self.config.wait_empty_poll());
    }

    /// Like [`Oracle::wait_empty`] but gives up after `limit`.
    ///
    /// Returns `true` if the queue was observed empty in time.
    pub fn wait_empty_timeout(&self, limit: Duration) -> bool {
        self.shared
            .queue
            .wait_empty_timeout(self.config.wait_empty_poll(), limit)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> OracleStats {
        self.shared
            .counters
            .snapshot(self.config.thread_count, self.shared.queue.len())
    }

    /// Join every handle, returning how many workers panicked.
    ///
    /// When called from one of the workers (a commit that drops or stops its
    /// own oracle), that worker is left detached. It is between commands
    /// once this returns and leaves its loop on seeing `Stopped`.
    fn join_all(&self, workers: &mut Vec<JoinHandle<()>>) -> usize {
        let current = thread::current().id();
        let mut panicked = 0;
        for (worker_id, handle) in workers.drain(..).enumerate() {
            if handle.thread().id() == current {
                debug!(
                    oracle_id = %self.shared.id,
                    worker_id,
                    "Stop requested from this worker, leaving it to exit on its own"
                );
                continue;
            }
            if handle.join().is_ok() {
                self.shared.counters.joined_workers.fetch_add(1, Ordering::Relaxed);
                debug!(oracle_id = %self.shared.id, worker_id, "Worker joined");
            } else {
                panicked += 1;
                error!(oracle_id = %self.shared.id, worker_id, "Worker thread panicked");
            }
        }
        panicked
    }

    /// Abandon every command left in the queue. Returns how many there were.
    fn dispose_queued(&self) -> usize {
        let leftovers = self.shared.queue.drain();
        let count = leftovers.len();
        for command in leftovers {
            if self.config.shutdown_policy == ShutdownPolicy::Abandon {
                warn!(
                    oracle_id = %self.shared.id,
                    command = command.name(),
                    "Abandoning queued command at shutdown"
                );
            }
            self.abandon(command);
        }
        count
    }

    fn abandon(&self, command: Box<dyn Command>) {
        self.shared
            .counters
            .abandoned_commands
            .fetch_add(1, Ordering::Relaxed);
        if let Err(panic) = catch_unwind(AssertUnwindSafe(move || command.abandon())) {
            error!(
                oracle_id = %self.shared.id,
                panic = panic_message(panic.as_ref()),
                "Command panicked while being abandoned"
            );
        }
    }
}

impl Drop for Oracle {
    fn drop(&mut self) {
        if self.state() == OracleState::Started {
            error!(
                oracle_id = %self.shared.id,
                "Oracle dropped while started; stop() should have been called explicitly"
            );
            if let Err(e) = self.stop() {
                error!(oracle_id = %self.shared.id, error = %e, "Implicit stop failed");
            }
        }
        // Commands submitted before `start` was ever called.
        self.dispose_queued();
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppResult, WorkerContext};
    use std::sync::atomic::AtomicBool;

    struct Flag {
        executed: Arc<AtomicBool>,
        committed: Arc<AtomicBool>,
    }

    impl Command for Flag {
        fn execute(&mut self, _ctx: &WorkerContext) -> AppResult<()> {
            self.executed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn commit(self: Box<Self>) {
            self.committed.store(true, Ordering::SeqCst);
        }
    }

    fn flag() -> (Box<Flag>, Arc<AtomicBool>, Arc<AtomicBool>) {
        let executed = Arc::new(AtomicBool::new(false));
        let committed = Arc::new(AtomicBool::new(false));
        let cmd = Box::new(Flag {
            executed: Arc::clone(&executed),
            committed: Arc::clone(&committed),
        });
        (cmd, executed, committed)
    }

    fn fast_config(threads: usize) -> OracleConfig {
        OracleConfig::new()
            .with_thread_count(threads)
            .with_dequeue_timeout_ms(10)
            .with_wait_empty_poll_ms(1)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Oracle::with_thread_count(0).unwrap_err();
        assert!(matches!(err, OracleError::InvalidConfig(_)));
    }

    #[test]
    fn test_start_stop_cycle() {
        let oracle = Oracle::new(fast_config(2)).unwrap();
        assert_eq!(oracle.state(), OracleState::Init);
        oracle.start().unwrap();
        assert_eq!(oracle.state(), OracleState::Started);
        oracle.stop().unwrap();
        assert_eq!(oracle.state(), OracleState::Stopped);

        let stats = oracle.stats();
        assert_eq!(stats.joined_workers, 2);
        assert_eq!(stats.running_workers, 0);
    }

    #[test]
    fn test_executes_and_commits() {
        let oracle = Oracle::new(fast_config(1)).unwrap();
        oracle.start().unwrap();
        let (cmd, executed, committed) = flag();
        oracle.submit(cmd);
        oracle.wait_empty();
        oracle.stop().unwrap();

        assert!(executed.load(Ordering::SeqCst));
        assert!(committed.load(Ordering::SeqCst));
        assert_eq!(oracle.stats().committed_commands, 1);
    }

    #[test]
    fn test_serialized_commit_policy_holds_lock() {
        let lock: CommitLock = Arc::new(Mutex::new(()));
        let oracle =
            Oracle::with_commit_policy(fast_config(2), CommitPolicy::Serialized(Arc::clone(&lock)))
                .unwrap();
        oracle.start().unwrap();

        let guard = lock.lock();
        let (cmd, executed, committed) = flag();
        oracle.submit(cmd);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !executed.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(executed.load(Ordering::SeqCst));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!committed.load(Ordering::SeqCst), "commit must wait for the lock");

        drop(guard);
        oracle.stop().unwrap();
        assert!(committed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_while_started_stops() {
        let (cmd, executed, _committed) = flag();
        {
            let oracle = Oracle::new(fast_config(1)).unwrap();
            oracle.start().unwrap();
            oracle.submit(cmd);
            oracle.wait_empty();
        }
        // The command was dequeued before drop, so it ran to completion.
        assert!(executed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
