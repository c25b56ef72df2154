//! Wire-level task types exchanged with the Conductor server.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A task instance handed out by `batch_poll`.
///
/// Opaque to the core except for the fields listed in §3.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInstance {
    pub task_id: String,
    pub workflow_instance_id: String,
    pub task_def_name: String,
    #[serde(default)]
    pub input_data: Map<String, Value>,
    #[serde(default)]
    pub poll_count: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub callback_after_seconds: Option<i64>,
    #[serde(default)]
    pub response_timeout_seconds: Option<i64>,
}

/// Status reported back to the server for one task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "FAILED_WITH_TERMINAL_ERROR")]
    FailedWithTerminalError,
}

/// A single log line a handler appended through its `TaskContext`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub message: String,
    pub task_id: String,
    pub created_time: i64,
}

/// The result of one execution attempt, sent once per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub workflow_instance_id: String,
    pub worker_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub output_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_for_incompletion: Option<String>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_after_seconds: Option<i64>,
}

impl TaskResult {
    /// Seed a blank result for one dispatch.
    pub fn seed(task: &TaskInstance, worker_id: &str) -> Self {
        Self {
            task_id: task.task_id.clone(),
            workflow_instance_id: task.workflow_instance_id.clone(),
            worker_id: worker_id.to_string(),
            status: TaskStatus::Completed,
            output_data: Map::new(),
            reason_for_incompletion: None,
            logs: Vec::new(),
            callback_after_seconds: None,
        }
    }
}
