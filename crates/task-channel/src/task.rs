//! Tasks and task results exchanged over the channel.

use common::{Payload, TaskId};
use serde::{Deserialize, Serialize};

/// Outcome reported by a worker for a consumed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// The handler ran its action successfully.
    Completed,

    /// The handler failed or the task timed out.
    Failed,

    /// The action was unnecessary (resource already absent). Treated as
    /// success by the coordinator so unwinding stays monotonic.
    NotApplicable,
}

impl TaskStatus {
    /// Returns true for outcomes the coordinator treats as success.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::NotApplicable)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
            TaskStatus::NotApplicable => "NotApplicable",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A unit of work pulled by a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Identifier correlating the task with its result and step record.
    pub task_id: TaskId,

    /// The queue this task belongs to; one handler kind per queue.
    pub task_kind: String,

    /// Flat input data for the handler.
    pub input_data: Payload,
}

impl Task {
    /// Creates a new task.
    pub fn new(task_id: TaskId, task_kind: impl Into<String>, input_data: Payload) -> Self {
        Self {
            task_id,
            task_kind: task_kind.into(),
            input_data,
        }
    }
}

/// The outcome of one task execution, produced by a worker (or
/// synthesized by the channel on lease exhaustion) and consumed by the
/// coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: TaskId,

    /// Execution outcome.
    pub status: TaskStatus,

    /// Data produced by the handler on success.
    pub output_data: Payload,

    /// Human-readable reason on failure.
    pub failure_reason: Option<String>,
}

impl TaskResult {
    /// A successful result carrying the handler's output.
    pub fn completed(task_id: TaskId, output_data: Payload) -> Self {
        Self {
            task_id,
            status: TaskStatus::Completed,
            output_data,
            failure_reason: None,
        }
    }

    /// A failed result with a reason.
    pub fn failed(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            output_data: Payload::new(),
            failure_reason: Some(reason.into()),
        }
    }

    /// A "nothing to do" result, counted as success.
    pub fn not_applicable(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::NotApplicable,
            output_data: Payload::new(),
            failure_reason: None,
        }
    }
}
