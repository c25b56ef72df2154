//! Synchronous event dispatch.
//!
//! Grounded on `groblegark-oddjobs`'s `crates/daemon/src/event_bus.rs` for
//! the publish/subscribe shape, simplified: that bus is WAL-backed for
//! crash recovery, which this crate's events have no need of, so dispatch
//! is in-memory and synchronous. A listener panic is caught and logged
//! rather than allowed to take down the runner that raised the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::domain::models::event::Event;

/// Receives every event the runner and supervisor raise.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// A registered listener, optionally narrowed to a single event variant.
/// `None` means "all variants" (the original `subscribe` path).
struct Subscription {
    variant: Option<&'static str>,
    listener: Arc<dyn EventListener>,
}

/// Dispatches events to listeners in registration order.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<RwLock<Vec<Subscription>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event variant. Registration order is
    /// dispatch order.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().expect("event bus lock poisoned").push(Subscription { variant: None, listener });
    }

    /// Register a listener for a single event variant, identified by
    /// [`Event::variant_name`]. The listener is skipped for every other
    /// variant.
    pub fn subscribe_variant(&self, variant: &'static str, listener: Arc<dyn EventListener>) {
        self.listeners.write().expect("event bus lock poisoned").push(Subscription { variant: Some(variant), listener });
    }

    /// Publish an event to every registered listener whose subscription
    /// matches it, isolating panics so one bad listener cannot prevent the
    /// others from observing the event or disrupt the caller.
    pub fn publish(&self, event: Event) {
        let listeners = self.listeners.read().expect("event bus lock poisoned");
        let matching: Vec<_> = listeners
            .iter()
            .filter(|sub| sub.variant.is_none_or(|v| v == event.variant_name()))
            .map(|sub| Arc::clone(&sub.listener))
            .collect();
        drop(listeners);

        for listener in &matching {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_event(&event)));
            if outcome.is_err() {
                tracing::warn!(event = event.variant_name(), "event listener panicked; continuing dispatch");
            }
        }
    }
}

/// Built-in listener that counts events per variant — every teacher service
/// that raises domain events also exposes a counter view over them.
#[derive(Default)]
pub struct MetricsListener {
    poll_started: AtomicU64,
    poll_completed: AtomicU64,
    poll_failure: AtomicU64,
    task_execution_started: AtomicU64,
    task_execution_completed: AtomicU64,
    task_execution_failure: AtomicU64,
    task_update_failure: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub poll_started: u64,
    pub poll_completed: u64,
    pub poll_failure: u64,
    pub task_execution_started: u64,
    pub task_execution_completed: u64,
    pub task_execution_failure: u64,
    pub task_update_failure: u64,
}

impl MetricsListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            poll_started: self.poll_started.load(Ordering::Relaxed),
            poll_completed: self.poll_completed.load(Ordering::Relaxed),
            poll_failure: self.poll_failure.load(Ordering::Relaxed),
            task_execution_started: self.task_execution_started.load(Ordering::Relaxed),
            task_execution_completed: self.task_execution_completed.load(Ordering::Relaxed),
            task_execution_failure: self.task_execution_failure.load(Ordering::Relaxed),
            task_update_failure: self.task_update_failure.load(Ordering::Relaxed),
        }
    }
}

impl EventListener for MetricsListener {
    fn on_event(&self, event: &Event) {
        let counter = match event {
            Event::PollStarted { .. } => &self.poll_started,
            Event::PollCompleted { .. } => &self.poll_completed,
            Event::PollFailure { .. } => &self.poll_failure,
            Event::TaskExecutionStarted { .. } => &self.task_execution_started,
            Event::TaskExecutionCompleted { .. } => &self.task_execution_completed,
            Event::TaskExecutionFailure { .. } => &self.task_execution_failure,
            Event::TaskUpdateFailure { .. } => &self.task_update_failure,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
