//! Port interfaces the application layer depends on, implemented by
//! `infrastructure`.
//!
//! Note: in strict Clean Architecture this module would not reference
//! `infrastructure::http::error`; the error enum lives there anyway so
//! callers matching on HTTP-shaped failures see
//! one type. The teacher makes the same pragmatic call in
//! `domain/ports/claude_client.rs`.

use async_trait::async_trait;
use serde_json::Value;

use super::models::task::{TaskInstance, TaskResult};
use crate::infrastructure::http::error::HttpError;

/// A minimal task-definition object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_keys: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_keys: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TaskDef {
    /// A minimal definition containing only the name (§4.7 step 3, "otherwise
    /// use a minimal record containing only the name").
    pub fn minimal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_keys: None,
            output_keys: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Port interface for the Conductor server's REST surface.
///
/// Implementations carry their own credential acquisition/refresh and
/// connection pooling.
#[async_trait]
pub trait ServerClient: Send + Sync {
    /// Poll for up to `count` pending tasks of `task_type`.
    ///
    /// `domain` is omitted from the request entirely when empty, never
    /// sent as an empty-string query parameter.
    async fn batch_poll(
        &self,
        task_type: &str,
        worker_id: &str,
        count: usize,
        timeout_millis: u64,
        domain: Option<&str>,
    ) -> Result<Vec<TaskInstance>, HttpError>;

    /// Report one attempt's result. Idempotent on the server side against
    /// `(task_id, workflow_instance_id)`.
    async fn update_task(&self, result: &TaskResult) -> Result<String, HttpError>;

    /// Upsert (or create-if-absent) a task definition.
    async fn register_task_definition(&self, def: &TaskDef, overwrite: bool) -> Result<(), HttpError>;

    /// Register a JSON-Schema draft-07 document under `name`/`version`.
    async fn register_schema(&self, name: &str, version: u32, body: &Value) -> Result<(), HttpError>;
}
