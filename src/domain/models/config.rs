//! Resolved, per-handler worker options.

use serde::{Deserialize, Serialize};

/// Fully-resolved option set for one handler's runner.
///
/// Produced once by `ConfigResolver` at startup and immutable for the
/// life of the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedOptions {
    /// Minimum delay between polls when idle.
    pub poll_interval_millis: u64,
    /// Width of the concurrency gate.
    pub max_concurrent: usize,
    /// If non-empty, scopes polling to this domain.
    pub domain: String,
    /// Identity reported to the server.
    pub worker_id: String,
    /// Server-side long-poll hold time.
    pub poll_timeout_millis: u64,
    /// Whether to push the task definition at startup.
    pub register_task_def: bool,
    /// If true, upsert the task definition in place; else skip when already present.
    pub overwrite_task_def: bool,
    /// Controls `additionalProperties` in generated schemas.
    pub strict_schema: bool,
    /// If true, runner polls skip the server.
    pub paused: bool,
}

impl Default for ResolvedOptions {
    fn default() -> Self {
        Self {
            poll_interval_millis: 100,
            max_concurrent: 1,
            domain: String::new(),
            worker_id: host_derived_worker_id(),
            poll_timeout_millis: 100,
            register_task_def: false,
            overwrite_task_def: true,
            strict_schema: false,
            paused: false,
        }
    }
}

/// Handler-declared defaults consulted at config-resolver tier 6.
/// `None` means "no handler-level override; fall through to the system
/// default" for that property.
#[derive(Debug, Clone, Default)]
pub struct HandlerDefaults {
    pub poll_interval_millis: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub domain: Option<String>,
    pub worker_id: Option<String>,
    pub poll_timeout_millis: Option<u64>,
    pub register_task_def: Option<bool>,
    pub overwrite_task_def: Option<bool>,
    pub strict_schema: Option<bool>,
    pub paused: Option<bool>,
}

/// System default for `worker_id`: host-derived.
pub fn host_derived_worker_id() -> String {
    hostname_or_fallback()
}

fn hostname_or_fallback() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown-worker".to_string())
}
