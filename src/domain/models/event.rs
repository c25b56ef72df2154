//! Lifecycle events published on the event bus.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskResult;

/// One lifecycle event. Every variant carries `timestamp` and `task_type`
/// (§4.3: "all carry (timestamp, task_type)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    PollStarted {
        timestamp: DateTime<Utc>,
        task_type: String,
        worker_id: String,
        requested_count: usize,
    },
    PollCompleted {
        timestamp: DateTime<Utc>,
        task_type: String,
        worker_id: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        received_count: usize,
    },
    PollFailure {
        timestamp: DateTime<Utc>,
        task_type: String,
        worker_id: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        cause: String,
    },
    TaskExecutionStarted {
        timestamp: DateTime<Utc>,
        task_type: String,
        task_id: String,
        workflow_instance_id: String,
        worker_id: String,
    },
    TaskExecutionCompleted {
        timestamp: DateTime<Utc>,
        task_type: String,
        task_id: String,
        workflow_instance_id: String,
        worker_id: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        output_size_bytes: usize,
    },
    TaskExecutionFailure {
        timestamp: DateTime<Utc>,
        task_type: String,
        task_id: String,
        workflow_instance_id: String,
        worker_id: String,
        #[serde(with = "duration_millis")]
        duration: Duration,
        cause: String,
        is_terminal: bool,
    },
    TaskUpdateFailure {
        timestamp: DateTime<Utc>,
        task_type: String,
        task_id: String,
        workflow_instance_id: String,
        worker_id: String,
        attempts: u32,
        cause: String,
        task_result: Box<TaskResult>,
    },
}

impl Event {
    /// The `task_type` every variant carries, for listeners that filter by type.
    pub fn task_type(&self) -> &str {
        match self {
            Event::PollStarted { task_type, .. }
            | Event::PollCompleted { task_type, .. }
            | Event::PollFailure { task_type, .. }
            | Event::TaskExecutionStarted { task_type, .. }
            | Event::TaskExecutionCompleted { task_type, .. }
            | Event::TaskExecutionFailure { task_type, .. }
            | Event::TaskUpdateFailure { task_type, .. } => task_type,
        }
    }

    /// Short, stable name of the variant, used by the metrics listener.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Event::PollStarted { .. } => "poll_started",
            Event::PollCompleted { .. } => "poll_completed",
            Event::PollFailure { .. } => "poll_failure",
            Event::TaskExecutionStarted { .. } => "task_execution_started",
            Event::TaskExecutionCompleted { .. } => "task_execution_completed",
            Event::TaskExecutionFailure { .. } => "task_execution_failure",
            Event::TaskUpdateFailure { .. } => "task_update_failure",
        }
    }
}

mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        #[allow(clippy::cast_possible_truncation)]
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_accessor_covers_every_variant() {
        let e = Event::PollStarted {
            timestamp: Utc::now(),
            task_type: "greet".into(),
            worker_id: "w1".into(),
            requested_count: 5,
        };
        assert_eq!(e.task_type(), "greet");
        assert_eq!(e.variant_name(), "poll_started");
    }
}
