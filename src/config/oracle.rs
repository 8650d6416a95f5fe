//! Oracle configuration structures.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to commands still queued when an oracle stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Lossy shutdown: leftovers are handed to `abandon` without logging each one.
    #[default]
    Discard,
    /// Same disposal, but every abandoned command is logged at warn level.
    Abandon,
}

/// Configuration for a single oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Number of worker threads started by `start`.
    pub thread_count: usize,
    /// How long an idle worker waits on the queue before re-checking the state.
    pub dequeue_timeout_ms: u64,
    /// Poll interval used by `wait_empty`.
    pub wait_empty_poll_ms: u64,
    /// Stack size for worker threads; `None` keeps the platform default.
    pub thread_stack_size: Option<usize>,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
    /// Disposal of queued commands at shutdown.
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            thread_count: num_cpus::get().max(1),
            dequeue_timeout_ms: 100,
            wait_empty_poll_ms: 10,
            thread_stack_size: None,
            thread_name_prefix: "oracle-worker".into(),
            shutdown_policy: ShutdownPolicy::Discard,
        }
    }
}

impl OracleConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the idle dequeue timeout.
    #[must_use]
    pub fn with_dequeue_timeout_ms(mut self, ms: u64) -> Self {
        self.dequeue_timeout_ms = ms;
        self
    }

    /// Set the `wait_empty` poll interval.
    #[must_use]
    pub fn with_wait_empty_poll_ms(mut self, ms: u64) -> Self {
        self.wait_empty_poll_ms = ms;
        self
    }

    /// Set the worker stack size.
    #[must_use]
    pub fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the shutdown policy.
    #[must_use]
    pub fn with_shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    /// Idle dequeue timeout as a `Duration`.
    #[must_use]
    pub const fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// `wait_empty` poll interval as a `Duration`.
    #[must_use]
    pub const fn wait_empty_poll(&self) -> Duration {
        Duration::from_millis(self.wait_empty_poll_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_count == 0 {
            return Err("thread_count must be greater than 0".into());
        }
        if self.dequeue_timeout_ms == 0 {
            return Err("dequeue_timeout_ms must be greater than 0".into());
        }
        if self.wait_empty_poll_ms == 0 {
            return Err("wait_empty_poll_ms must be greater than 0".into());
        }
        if self.thread_stack_size == Some(0) {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `ORACLE_*` environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a message if a variable is not a valid number or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_number("ORACLE_THREAD_COUNT")? {
            cfg.thread_count = v;
        }
        if let Some(v) = env_number("ORACLE_DEQUEUE_TIMEOUT_MS")? {
            cfg.dequeue_timeout_ms = v;
        }
        if let Some(v) = env_number("ORACLE_WAIT_EMPTY_POLL_MS")? {
            cfg.wait_empty_poll_ms = v;
        }
        if let Some(v) = env_number("ORACLE_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = Some(v);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("{name} must be a number, got `{raw}`")),
        Err(_) => Ok(None),
    }
}

/// A named set of oracles, e.g. one for network loads and one for parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OracleSetConfig {
    /// Map of oracle name to configuration.
    pub oracles: HashMap<String, OracleConfig>,
}

impl OracleSetConfig {
    /// Validate all oracles and ensure at least one exists.
    ///
    /// # Errors
    ///
    /// Returns the first invalid oracle and its problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.oracles.is_empty() {
            return Err("at least one oracle must be defined".into());
        }
        for (name, oracle) in &self.oracles {
            oracle
                .validate()
                .map_err(|e| format!("oracle `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse a set from a JSON string and validate it.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
