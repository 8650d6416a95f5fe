//! Tests for the lifecycle state machine under contention

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use stone_oracle::core::{Lifecycle, OracleState};

#[test]
fn test_only_one_thread_wins_a_transition() {
    let lifecycle = Arc::new(Lifecycle::new());
    let winners = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            let winners = Arc::clone(&winners);
            thread::spawn(move || {
                if lifecycle.try_transition(OracleState::Init, OracleState::Started) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.current(), OracleState::Started);
}

#[test]
fn test_state_display() {
    assert_eq!(OracleState::Init.to_string(), "init");
    assert_eq!(OracleState::Started.to_string(), "started");
    assert_eq!(OracleState::Stopped.to_string(), "stopped");
}
