//! Integration tests for asynchronous commands
//!
//! Async commands run their future on the executing worker's own
//! single-threaded runtime, so an application inside its own tokio runtime
//! can hand work to the oracle and await the committed result.

#![cfg(feature = "tokio-runtime")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stone_oracle::config::OracleConfig;
use stone_oracle::core::{AppResult, AsyncAdapter, AsyncCommand, Oracle};
use tokio::sync::oneshot;

/// Simulates a slow archive lookup that yields to the worker runtime.
struct LookupCommand {
    study: String,
    delay: Duration,
    answer: Option<String>,
    reply: oneshot::Sender<Result<String, String>>,
}

#[async_trait]
impl AsyncCommand for LookupCommand {
    async fn run(&mut self) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        if self.study.is_empty() {
            anyhow::bail!("empty study identifier");
        }
        self.answer = Some(format!("series-of-{}", self.study));
        Ok(())
    }

    fn commit(self: Box<Self>) {
        let result = self.answer.ok_or_else(|| "lookup failed".to_string());
        let _ = self.reply.send(result);
    }

    fn abandon(self: Box<Self>) {
        let _ = self.reply.send(Err("abandoned".into()));
    }

    fn name(&self) -> &str {
        "lookup"
    }
}

fn config(threads: usize) -> OracleConfig {
    OracleConfig::new()
        .with_thread_count(threads)
        .with_dequeue_timeout_ms(10)
        .with_wait_empty_poll_ms(1)
}

type Reply = oneshot::Receiver<Result<String, String>>;

fn lookup(study: &str, delay_ms: u64) -> (AsyncAdapter<LookupCommand>, Reply) {
    let (tx, rx) = oneshot::channel();
    let command = AsyncAdapter::new(LookupCommand {
        study: study.to_string(),
        delay: Duration::from_millis(delay_ms),
        answer: None,
        reply: tx,
    });
    (command, rx)
}

#[tokio::test]
async fn test_async_command_result_awaited_from_caller_runtime() {
    let oracle = Oracle::new(config(2)).unwrap();
    oracle.start().unwrap();

    let (command, rx) = lookup("1.2.840.1", 10);
    oracle.submit(Box::new(command));
    let answer = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, Ok("series-of-1.2.840.1".to_string()));

    oracle.stop().unwrap();
}

#[tokio::test]
async fn test_async_command_failure_is_committed() {
    let oracle = Oracle::new(config(1)).unwrap();
    oracle.start().unwrap();

    let (command, rx) = lookup("", 1);
    oracle.submit(Box::new(command));
    let answer = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(answer, Err("lookup failed".to_string()));

    oracle.stop().unwrap();
    assert_eq!(oracle.stats().failed_commands, 1);
}

#[test]
fn test_async_commands_reuse_worker_runtime() {
    let oracle = Oracle::new(config(1)).unwrap();
    oracle.start().unwrap();

    let completed = Arc::new(AtomicUsize::new(0));
    let mut receivers = Vec::new();
    for i in 0..10 {
        let (command, rx) = lookup(&format!("study-{i}"), 1);
        oracle.submit(Box::new(command));
        receivers.push(rx);
    }
    oracle.wait_empty();
    oracle.stop().unwrap();

    for rx in receivers {
        if let Ok(Ok(_)) = rx.blocking_recv() {
            completed.fetch_add(1, Ordering::SeqCst);
        }
    }
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}

#[test]
fn test_async_command_abandoned_after_stop() {
    let oracle = Oracle::new(config(1)).unwrap();
    oracle.start().unwrap();
    oracle.stop().unwrap();

    let (command, rx) = lookup("late", 1);
    oracle.submit(Box::new(command));
    assert_eq!(rx.blocking_recv().unwrap(), Err("abandoned".to_string()));
}
