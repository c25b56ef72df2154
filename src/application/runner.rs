//! Per-handler poll/dispatch/update loop.
//!
//! Grounded on the teacher's `application/task_coordinator.rs` for the
//! actor shape (one long-running loop owning a `JoinSet` of in-flight
//! work, Arc-shared ports injected at construction). The thread-pool and
//! cooperative variants collapse to one loop here: `tokio::sync::Semaphore`
//! is the concurrency gate either way, and `HandlerKind` only changes
//! which Tokio primitive dispatches a given invocation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::domain::models::config::ResolvedOptions;
use crate::domain::models::event::Event;
use crate::domain::models::handler::{ErasedOutcome, Handler, HandlerKind, TaskContext};
use crate::domain::models::task::{TaskInstance, TaskResult, TaskStatus};
use crate::domain::ports::ServerClient;

use super::event_bus::EventBus;

/// Delay schedule before update retries 2, 3, 4: waits 10, 20, and 30
/// seconds respectively. Fixed, not exponential — see the design notes.
const UPDATE_RETRY_DELAYS: [Duration; 3] = [Duration::from_secs(10), Duration::from_secs(20), Duration::from_secs(30)];
const MAX_UPDATE_ATTEMPTS: u32 = 4;

/// One handler's poll-execute-update actor.
pub struct Runner {
    handler: Arc<dyn Handler>,
    client: Arc<dyn ServerClient>,
    options: ResolvedOptions,
    events: EventBus,
}

impl Runner {
    #[must_use]
    pub fn new(handler: Arc<dyn Handler>, client: Arc<dyn ServerClient>, options: ResolvedOptions, events: EventBus) -> Self {
        Self { handler, client, options, events }
    }

    /// Run until `stop` is signalled. In-flight executors finish their
    /// update attempts on a best-effort basis before `run` returns.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent.max(1)));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        let mut consecutive_empty_polls: u32 = 0;
        let mut auth_failure_count: u32 = 0;
        let mut last_poll_at: Option<Instant> = None;
        let mut last_auth_failure_at: Option<Instant> = None;

        loop {
            if *stop.borrow() {
                break;
            }

            // Step A: reap completed entries.
            while in_flight.try_join_next().is_some() {}

            // Step B: capacity.
            let inflight = in_flight.len();
            if inflight >= self.options.max_concurrent {
                tokio::time::sleep(Duration::from_millis(1)).await;
                continue;
            }

            // Step C: empty-poll backoff.
            if consecutive_empty_polls > 0 {
                let delay_millis = (1u64 << consecutive_empty_polls.min(10)).min(self.options.poll_interval_millis);
                let delay = Duration::from_millis(delay_millis);
                if let Some(last) = last_poll_at {
                    let elapsed = last.elapsed();
                    if elapsed < delay {
                        tokio::time::sleep(delay - elapsed).await;
                        continue;
                    }
                }
            }

            // Step D: auth backoff.
            if auth_failure_count > 0 {
                let backoff = Duration::from_secs(2u64.saturating_pow(auth_failure_count).min(60));
                if let Some(last) = last_auth_failure_at {
                    if last.elapsed() < backoff {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                }
            }

            // Step E: paused.
            if self.options.paused {
                tokio::time::sleep(Duration::from_millis(self.options.poll_interval_millis)).await;
                continue;
            }

            // Step F: poll.
            let slots = self.options.max_concurrent - inflight;
            self.events.publish(Event::PollStarted {
                timestamp: Utc::now(),
                task_type: self.handler.task_type().to_string(),
                worker_id: self.options.worker_id.clone(),
                requested_count: slots,
            });

            let domain = if self.options.domain.is_empty() { None } else { Some(self.options.domain.as_str()) };
            let poll_started_at = Instant::now();
            let poll_result = self
                .client
                .batch_poll(self.handler.task_type(), &self.options.worker_id, slots, self.options.poll_timeout_millis, domain)
                .await;
            let duration = poll_started_at.elapsed();

            let tasks = match poll_result {
                Err(err) => {
                    if err.is_auth() {
                        auth_failure_count += 1;
                        last_auth_failure_at = Some(Instant::now());
                    }
                    self.events.publish(Event::PollFailure {
                        timestamp: Utc::now(),
                        task_type: self.handler.task_type().to_string(),
                        worker_id: self.options.worker_id.clone(),
                        duration,
                        cause: err.to_string(),
                    });
                    continue;
                }
                Ok(tasks) => tasks,
            };

            let received_count = tasks.len();
            self.events.publish(Event::PollCompleted {
                timestamp: Utc::now(),
                task_type: self.handler.task_type().to_string(),
                worker_id: self.options.worker_id.clone(),
                duration,
                received_count,
            });

            // A successful poll resets auth backoff regardless of task count.
            auth_failure_count = 0;
            if received_count == 0 {
                consecutive_empty_polls += 1;
            } else {
                consecutive_empty_polls = 0;
            }
            last_poll_at = Some(Instant::now());

            // Step G: dispatch.
            for task in tasks {
                let permit = Arc::clone(&semaphore)
                    .try_acquire_owned()
                    .expect("slots were computed against free capacity");
                let handler = Arc::clone(&self.handler);
                let client = Arc::clone(&self.client);
                let events = self.events.clone();
                let worker_id = self.options.worker_id.clone();
                in_flight.spawn(async move {
                    execute_and_update(handler, client, events, worker_id, task).await;
                    drop(permit);
                });
            }
        }

        while in_flight.join_next().await.is_some() {}
    }
}

/// The execute-and-update unit of work.
async fn execute_and_update(handler: Arc<dyn Handler>, client: Arc<dyn ServerClient>, events: EventBus, worker_id: String, task: TaskInstance) {
    let mut result = TaskResult::seed(&task, &worker_id);
    let ctx = TaskContext::for_task(&task);

    events.publish(Event::TaskExecutionStarted {
        timestamp: Utc::now(),
        task_type: handler.task_type().to_string(),
        task_id: task.task_id.clone(),
        workflow_instance_id: task.workflow_instance_id.clone(),
        worker_id: worker_id.clone(),
    });

    let started_at = Instant::now();
    let outcome = handler.execute(ctx.clone(), task.input_data.clone()).await;
    let duration = started_at.elapsed();

    let mut is_failure_terminal: Option<bool> = None;
    match outcome {
        ErasedOutcome::Completed(value) => {
            result.status = TaskStatus::Completed;
            result.output_data = wrap_output(value);
        }
        ErasedOutcome::InProgress { output, callback_after_seconds } => {
            result.status = TaskStatus::InProgress;
            result.output_data = wrap_output(output);
            result.callback_after_seconds = Some(i64::try_from(callback_after_seconds).unwrap_or(i64::MAX));
        }
        ErasedOutcome::TerminalError(message) => {
            result.status = TaskStatus::FailedWithTerminalError;
            result.reason_for_incompletion = Some(message);
            is_failure_terminal = Some(true);
        }
        ErasedOutcome::Error(message) => {
            result.status = TaskStatus::Failed;
            result.reason_for_incompletion = Some(message);
            is_failure_terminal = Some(false);
        }
    }

    // Merge context side effects: logs always; the callback override only
    // wins on a completed result, never on an in-progress marker's own delay.
    result.logs = ctx.drain_logs();
    let callback_override = ctx.take_callback_override();
    if result.status == TaskStatus::Completed {
        if let Some(seconds) = callback_override {
            result.callback_after_seconds = Some(seconds);
        }
    }

    match is_failure_terminal {
        Some(is_terminal) => events.publish(Event::TaskExecutionFailure {
            timestamp: Utc::now(),
            task_type: handler.task_type().to_string(),
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            worker_id: worker_id.clone(),
            duration,
            cause: result.reason_for_incompletion.clone().unwrap_or_default(),
            is_terminal,
        }),
        None => events.publish(Event::TaskExecutionCompleted {
            timestamp: Utc::now(),
            task_type: handler.task_type().to_string(),
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            worker_id: worker_id.clone(),
            duration,
            output_size_bytes: serde_json::to_vec(&result.output_data).map(|v| v.len()).unwrap_or(0),
        }),
    }

    run_update_protocol(client, events, handler.task_type().to_string(), worker_id, task, result).await;
}

/// Wrap a non-object handler return value as `{"result": value}`; pass an
/// object value through unchanged.
fn wrap_output(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

/// Up to four `update_task` attempts with the 10/20/30s wait schedule
/// between them.
async fn run_update_protocol(client: Arc<dyn ServerClient>, events: EventBus, task_type: String, worker_id: String, task: TaskInstance, result: TaskResult) {
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        if attempt > 1 {
            tokio::time::sleep(UPDATE_RETRY_DELAYS[(attempt - 2) as usize]).await;
        }
        if client.update_task(&result).await.is_ok() {
            return;
        }
    }

    tracing::error!(
        critical = true,
        task_id = %task.task_id,
        workflow_instance_id = %task.workflow_instance_id,
        attempts = MAX_UPDATE_ATTEMPTS,
        "exhausted update_task retries; task result may be lost"
    );
    events.publish(Event::TaskUpdateFailure {
        timestamp: Utc::now(),
        task_type,
        task_id: task.task_id,
        workflow_instance_id: task.workflow_instance_id,
        worker_id,
        attempts: MAX_UPDATE_ATTEMPTS,
        cause: "update_task did not succeed within the retry budget".to_string(),
        task_result: Box::new(result),
    });
}
