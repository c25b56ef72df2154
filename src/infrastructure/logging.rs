//! Structured logging setup that the event severities ride on top of.
//!
//! Grounded on the teacher's `main.rs` tracing-subscriber bootstrap:
//! `EnvFilter` driven by `RUST_LOG`, defaulting to `info` so a worker run
//! with no configuration still produces useful output.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber. Call once, near the start
/// of `main`. Safe to call more than once in tests; later calls are
/// no-ops because `tracing` only accepts the first global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
