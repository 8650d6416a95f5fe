//! Lifecycle state machine shared by the oracle facade and its workers.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an oracle. Transitions only move forward:
/// `Init -> Started -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleState {
    /// Constructed; submissions are queued but nothing runs yet.
    Init,
    /// Worker threads are running.
    Started,
    /// Workers have been told to exit; submissions are rejected.
    Stopped,
}

impl fmt::Display for OracleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::Started => write!(f, "started"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Mutex-guarded lifecycle with compare-and-transition semantics.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<OracleState>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle in the `Init` state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OracleState::Init),
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> OracleState {
        *self.state.lock()
    }

    /// Move from `from` to `to` if the current state is `from`.
    ///
    /// Returns `false` and leaves the state untouched otherwise. Backward
    /// transitions are never accepted.
    pub fn try_transition(&self, from: OracleState, to: OracleState) -> bool {
        if !is_forward(from, to) {
            return false;
        }
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Run `f` while holding the state lock.
    ///
    /// No transition can happen until `f` returns, so work done inside is
    /// atomic with respect to `start`/`stop`. Keep `f` short.
    pub fn with_state<T>(&self, f: impl FnOnce(OracleState) -> T) -> T {
        let state = self.state.lock();
        f(*state)
    }
}

const fn is_forward(from: OracleState, to: OracleState) -> bool {
    matches!(
        (from, to),
        (OracleState::Init, OracleState::Started) | (OracleState::Started, OracleState::Stopped)
    )
}
