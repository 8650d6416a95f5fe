//! Worker threads of an oracle.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, warn};

use crate::config::OracleConfig;
use crate::core::{Command, OracleState, WorkerContext};

use super::{panic_message, CommitPolicy, Shared};

/// Spawn one worker thread.
pub(super) fn spawn_worker(
    worker_id: usize,
    shared: Arc<Shared>,
    config: &OracleConfig,
) -> io::Result<JoinHandle<()>> {
    let mut builder =
        thread::Builder::new().name(format!("{}-{worker_id}", config.thread_name_prefix));
    if let Some(stack_size) = config.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }
    builder.spawn(move || run_worker(worker_id, &shared))
}

/// Worker loop: re-check the state, wait for a command, run it, repeat.
///
/// The state is only read between commands, so a dequeued command always
/// completes both phases even if `stop` is called meanwhile.
fn run_worker(worker_id: usize, shared: &Shared) {
    let ctx = WorkerContext::new(worker_id, shared.id);
    shared.counters.running_workers.fetch_add(1, Ordering::Relaxed);
    debug!(oracle_id = %shared.id, worker_id, "Worker thread started");

    loop {
        if shared.lifecycle.current() == OracleState::Stopped {
            break;
        }

        if let Some(command) = shared.queue.dequeue(shared.dequeue_timeout) {
            run_command(&ctx, shared, command);
        }
    }

    shared.counters.running_workers.fetch_sub(1, Ordering::Relaxed);
    debug!(oracle_id = %shared.id, worker_id, "Worker thread exiting");
}

/// Execute then commit one command. Neither phase may take the worker down.
fn run_command(ctx: &WorkerContext, shared: &Shared, mut command: Box<dyn Command>) {
    let counters = &shared.counters;
    counters.active_commands.fetch_add(1, Ordering::Relaxed);

    let name = command.name().to_owned();
    let worker_id = ctx.worker_id();
    let started = Instant::now();

    match catch_unwind(AssertUnwindSafe(|| command.execute(ctx))) {
        Ok(Ok(())) => {
            counters.succeeded_commands.fetch_add(1, Ordering::Relaxed);
            debug!(
                oracle_id = %shared.id,
                worker_id,
                command = %name,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Command executed"
            );
        }
        Ok(Err(e)) => {
            counters.failed_commands.fetch_add(1, Ordering::Relaxed);
            warn!(
                oracle_id = %shared.id,
                worker_id,
                command = %name,
                error = ?e,
                "Command execution failed"
            );
        }
        Err(panic) => {
            counters.failed_commands.fetch_add(1, Ordering::Relaxed);
            error!(
                oracle_id = %shared.id,
                worker_id,
                command = %name,
                panic = panic_message(panic.as_ref()),
                "Command panicked during execution"
            );
        }
    }

    let commit = move || match &shared.commit_policy {
        CommitPolicy::Concurrent => command.commit(),
        CommitPolicy::Serialized(lock) => {
            let _guard = lock.lock();
            command.commit();
        }
    };
    if let Err(panic) = catch_unwind(AssertUnwindSafe(commit)) {
        error!(
            oracle_id = %shared.id,
            worker_id,
            command = %name,
            panic = panic_message(panic.as_ref()),
            "Command panicked during commit"
        );
    }

    counters.committed_commands.fetch_add(1, Ordering::Relaxed);
    counters.active_commands.fetch_sub(1, Ordering::Relaxed);
}
