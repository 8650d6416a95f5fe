//! Telemetry helpers for structured logging.

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs a default env-filtered fmt subscriber if none is set.
///
/// The filter is read from `RUST_LOG`, e.g. `RUST_LOG=stone_oracle=debug`
/// to see per-command worker records.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
