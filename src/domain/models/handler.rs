//! The user-supplied handler abstraction.
//!
//! A handler is registered as either a blocking (synchronous) function or
//! a cooperative (async) function, matching the two runner substrates of
//! §4.5. Both are type-erased behind the [`Handler`] trait object so the
//! Supervisor can hold a heterogeneous set of them.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::task::{LogEntry, TaskInstance};

/// Which concurrency substrate a handler runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Synchronous handler, dispatched via `spawn_blocking` (thread-pool variant).
    Blocking,
    /// Async handler, dispatched via `spawn` (cooperative variant).
    Cooperative,
}

/// The sentinel/non-sentinel exception distinction of §7, expressed as a
/// closed `Result` error instead of two exception types.
#[derive(Debug, Error, Clone)]
pub enum HandlerError {
    /// "threw the sentinel exception that means no retry".
    #[error("{0}")]
    Terminal(String),
    /// "threw any other exception", server-driven retry.
    #[error("{0}")]
    Retryable(String),
}

/// A handler's return value: done, or "call me back later".
#[derive(Debug, Clone)]
pub enum HandlerOutcome<O> {
    Completed(O),
    InProgress { output: O, callback_after_seconds: u64 },
}

/// What a handler invocation returns before the runner converts it into a
/// [`crate::domain::models::task::TaskResult`].
pub type HandlerResult<O> = Result<HandlerOutcome<O>, HandlerError>;

/// Per-invocation context, injected as the handler's first argument (§9
/// "thread-local task context"). Exposes task metadata and a place for
/// the handler to append log entries or override the callback delay.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub workflow_instance_id: String,
    pub poll_count: u32,
    pub retry_count: u32,
    logs: Arc<Mutex<Vec<LogEntry>>>,
    callback_override: Arc<Mutex<Option<i64>>>,
}

impl TaskContext {
    pub(crate) fn for_task(task: &TaskInstance) -> Self {
        Self {
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            poll_count: task.poll_count,
            retry_count: task.retry_count,
            logs: Arc::new(Mutex::new(Vec::new())),
            callback_override: Arc::new(Mutex::new(None)),
        }
    }

    /// Append a log entry to be merged into the `TaskResult`.
    pub fn log(&self, message: impl Into<String>) {
        let created_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        self.logs.lock().unwrap_or_else(|e| e.into_inner()).push(LogEntry {
            message: message.into(),
            task_id: self.task_id.clone(),
            created_time,
        });
    }

    /// Override the callback-after-seconds for this attempt. Wins over any
    /// value the handler's return carried.
    pub fn set_callback_after_seconds(&self, seconds: i64) {
        *self.callback_override.lock().unwrap_or_else(|e| e.into_inner()) = Some(seconds);
    }

    pub(crate) fn drain_logs(&self) -> Vec<LogEntry> {
        std::mem::take(&mut self.logs.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn take_callback_override(&self) -> Option<i64> {
        self.callback_override.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Type-erased handler outcome, after the handler's concrete output type
/// has been serialized to JSON.
pub enum ErasedOutcome {
    Completed(Value),
    InProgress { output: Value, callback_after_seconds: u64 },
    TerminalError(String),
    Error(String),
}

/// The object-safe handler seam the Supervisor and Runner hold.
#[async_trait]
pub trait Handler: Send + Sync {
    fn task_type(&self) -> &str;
    fn max_concurrent_default(&self) -> usize;
    fn domain_default(&self) -> Option<&str>;
    fn kind(&self) -> HandlerKind;
    /// JSON-Schema draft-07 for the handler's parameters, or `None`
    /// if synthesis is unavailable.
    fn input_schema(&self, strict_schema: bool) -> Option<Value>;
    /// JSON-Schema draft-07 for the handler's declared return type.
    fn output_schema(&self, strict_schema: bool) -> Option<Value>;
    /// Invoke the handler with its input bound by parameter name.
    async fn execute(&self, ctx: TaskContext, input: Map<String, Value>) -> ErasedOutcome;
}

enum HandlerBody<I, O> {
    Blocking(Arc<dyn Fn(TaskContext, I) -> HandlerResult<O> + Send + Sync>),
    Cooperative(Arc<dyn Fn(TaskContext, I) -> BoxFuture<'static, HandlerResult<O>> + Send + Sync>),
}

/// Concrete handler wrapping a typed function. `I`'s `serde` field names
/// ARE the declared parameter names (§4.6's "by parameter name" binding,
/// realized as ordinary struct deserialization).
pub struct TypedHandler<I, O> {
    task_type: String,
    max_concurrent: usize,
    domain: Option<String>,
    body: HandlerBody<I, O>,
    _marker: PhantomData<fn() -> (I, O)>,
}

impl<I, O> TypedHandler<I, O>
where
    I: DeserializeOwned + JsonSchema + Send + Sync + 'static,
    O: Serialize + JsonSchema + Send + Sync + 'static,
{
    /// Register a synchronous handler.
    pub fn blocking(
        task_type: impl Into<String>,
        max_concurrent: usize,
        f: impl Fn(TaskContext, I) -> HandlerResult<O> + Send + Sync + 'static,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            max_concurrent,
            domain: None,
            body: HandlerBody::Blocking(Arc::new(f)),
            _marker: PhantomData,
        }
    }

    /// Register a cooperative (async) handler.
    pub fn cooperative<F>(
        task_type: impl Into<String>,
        max_concurrent: usize,
        f: impl Fn(TaskContext, I) -> F + Send + Sync + 'static,
    ) -> Self
    where
        F: Future<Output = HandlerResult<O>> + Send + 'static,
    {
        Self {
            task_type: task_type.into(),
            max_concurrent,
            domain: None,
            body: HandlerBody::Cooperative(Arc::new(move |ctx, input| Box::pin(f(ctx, input)))),
            _marker: PhantomData,
        }
    }

    /// Scope this handler to polling only tasks tagged with `domain`.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Erase this handler's concrete types behind the `Handler` trait object,
    /// the shape the Supervisor holds.
    #[must_use]
    pub fn into_handler(self) -> Arc<dyn Handler> {
        Arc::new(self)
    }
}

#[async_trait]
impl<I, O> Handler for TypedHandler<I, O>
where
    I: DeserializeOwned + JsonSchema + Send + Sync + 'static,
    O: Serialize + JsonSchema + Send + Sync + 'static,
{
    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn max_concurrent_default(&self) -> usize {
        self.max_concurrent
    }

    fn domain_default(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    fn kind(&self) -> HandlerKind {
        match &self.body {
            HandlerBody::Blocking(_) => HandlerKind::Blocking,
            HandlerBody::Cooperative(_) => HandlerKind::Cooperative,
        }
    }

    fn input_schema(&self, strict_schema: bool) -> Option<Value> {
        crate::application::schema::generate_schema::<I>(strict_schema)
    }

    fn output_schema(&self, strict_schema: bool) -> Option<Value> {
        crate::application::schema::generate_schema::<O>(strict_schema)
    }

    async fn execute(&self, ctx: TaskContext, input: Map<String, Value>) -> ErasedOutcome {
        let parsed: Result<I, _> = serde_json::from_value(Value::Object(input));
        let input = match parsed {
            Ok(v) => v,
            // Missing required parameters → terminal error.
            Err(e) => return ErasedOutcome::TerminalError(format!("input schema violation: {e}")),
        };

        let outcome = match &self.body {
            HandlerBody::Blocking(f) => {
                let f = Arc::clone(f);
                let ctx_for_blocking = ctx.clone();
                tokio::task::spawn_blocking(move || f(ctx_for_blocking, input))
                    .await
                    .unwrap_or_else(|join_err| {
                        Err(HandlerError::Retryable(format!("handler panicked: {join_err}")))
                    })
            }
            HandlerBody::Cooperative(f) => f(ctx, input).await,
        };

        match outcome {
            Ok(HandlerOutcome::Completed(output)) => match serde_json::to_value(output) {
                Ok(value) => ErasedOutcome::Completed(value),
                Err(e) => ErasedOutcome::Error(format!("failed to serialize output: {e}")),
            },
            Ok(HandlerOutcome::InProgress { output, callback_after_seconds }) => {
                match serde_json::to_value(output) {
                    Ok(value) => ErasedOutcome::InProgress { output: value, callback_after_seconds },
                    Err(e) => ErasedOutcome::Error(format!("failed to serialize output: {e}")),
                }
            }
            Err(HandlerError::Terminal(msg)) => ErasedOutcome::TerminalError(msg),
            Err(HandlerError::Retryable(msg)) => ErasedOutcome::Error(msg),
        }
    }
}
