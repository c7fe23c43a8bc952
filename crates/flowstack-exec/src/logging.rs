//! Subscriber setup for hosts and tests.
//!
//! The library crates only emit events; installing a subscriber is left to
//! whoever owns the process.

use tracing_subscriber::EnvFilter;

/// Env var consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "FLOWSTACK_LOG";

fn filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directives) => EnvFilter::new(directives),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    }
}

/// Install a global fmt subscriber. Returns false if one was already set.
pub fn init_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Like [`init_tracing`] but writes through the test harness capture.
pub fn init_test_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_test_writer()
        .try_init()
        .is_ok()
}
