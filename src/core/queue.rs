//! Unbounded FIFO work queue with timed dequeue.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::Command;

/// Queue of pending commands shared by the oracle and its workers.
///
/// The queue owns both ends of an unbounded channel, so it can never be
/// disconnected while it is alive. Dropping the queue drops every command
/// still inside it.
pub struct WorkQueue {
    tx: Sender<Box<dyn Command>>,
    rx: Receiver<Box<dyn Command>>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue").field("len", &self.len()).finish()
    }
}

impl WorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Append a command at the tail and wake one blocked dequeuer.
    pub fn enqueue(&self, command: Box<dyn Command>) {
        // Both ends live in `self`, so the send cannot fail.
        let _ = self.tx.send(command);
    }

    /// Pop the head, waiting up to `timeout` for one to arrive.
    ///
    /// `None` is the normal idle result; workers use it to re-check the
    /// oracle state.
    pub fn dequeue(&self, timeout: Duration) -> Option<Box<dyn Command>> {
        match self.rx.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// True if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Block until the queue has been observed empty, checking every `poll`.
    ///
    /// Best effort: a command enqueued right after the check is not covered,
    /// and commands already dequeued may still be running.
    pub fn wait_empty(&self, poll: Duration) {
        while !self.is_empty() {
            thread::sleep(poll);
        }
    }

    /// Like [`WorkQueue::wait_empty`] but gives up after `limit`.
    ///
    /// Returns `true` if the queue was observed empty in time. A `limit` too
    /// large to form a deadline (such as `Duration::MAX`) waits without one.
    pub fn wait_empty_timeout(&self, poll: Duration, limit: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(limit) else {
            self.wait_empty(poll);
            return true;
        };
        loop {
            if self.is_empty() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(poll.min(deadline - now));
        }
    }

    /// Remove every queued command without blocking, in FIFO order.
    pub fn drain(&self) -> Vec<Box<dyn Command>> {
        self.rx.try_iter().collect()
    }
}
