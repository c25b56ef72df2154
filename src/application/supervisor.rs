//! Top-level orchestrator owning every runner.
//!
//! Grounded on the teacher's `main.rs` daemon-mode bootstrap (resolve
//! config, spawn isolated units, wait on a shutdown signal, join) and on
//! its use of `tokio::spawn` for fault isolation between independently
//! failing units.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::models::config::HandlerDefaults;
use crate::domain::models::handler::Handler;
use crate::domain::ports::ServerClient;
use crate::infrastructure::config::ConfigResolver;

use super::event_bus::EventBus;
use super::registration;
use super::runner::Runner;

/// Discovers handlers through explicit registration and runs one
/// isolated [`Runner`] per handler.
pub struct Supervisor {
    handlers: Vec<Arc<dyn Handler>>,
    client: Arc<dyn ServerClient>,
    events: EventBus,
}

impl Supervisor {
    #[must_use]
    pub fn new(client: Arc<dyn ServerClient>, events: EventBus) -> Self {
        Self { handlers: Vec::new(), client, events }
    }

    /// Register handlers for this supervisor to run.
    #[must_use]
    pub fn discover(mut self, handlers: Vec<Arc<dyn Handler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Resolve each handler's configuration, optionally register it with
    /// the server, and spawn its runner as an isolated task. Returns the
    /// join handles so the caller can await clean shutdown.
    ///
    /// `stop` broadcasts shutdown to every runner.
    pub async fn run(self, stop: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let resolver = ConfigResolver::system();
        let mut handles = Vec::with_capacity(self.handlers.len());

        for handler in self.handlers {
            let task_type = handler.task_type().to_string();
            let defaults = HandlerDefaults {
                max_concurrent: Some(handler.max_concurrent_default()),
                domain: handler.domain_default().map(str::to_string),
                ..Default::default()
            };
            let options = match resolver.resolve(&task_type, &defaults) {
                Ok(options) => options,
                Err(err) => {
                    tracing::error!(task_type, error = %err, "configuration resolution failed; handler will not run");
                    continue;
                }
            };

            if options.register_task_def {
                registration::register_handler(&handler, &self.client, &options).await;
            }

            let client = Arc::clone(&self.client);
            let events = self.events.clone();
            let stop = stop.clone();

            // Each runner is its own spawned task:
            // a panic inside `run()` fails only this JoinHandle (Tokio's
            // per-task panic boundary), never the other runners.
            let handle = tokio::spawn(async move {
                let runner = Runner::new(handler, client, options, events);
                runner.run(stop).await;
            });
            handles.push(handle);
        }

        handles
    }
}
