//! Shared identifiers, the task model, and the result record.

use std::fmt;

/// Unique identifier for a task in the queue.
pub type TaskId = u64;
/// 1-based index of a worker thread.
pub type WorkerId = usize;

/// Unit of work handed to workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    /// Sequential identifier assigned at submission.
    pub id: TaskId,
    /// Opaque label, e.g. `Task-3`.
    pub label: String,
}

impl Task {
    /// Construct a new task with the provided id and label.
    pub fn new(id: TaskId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
        }
    }
}

/// Record of one completed task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskResult {
    pub worker: String,
    pub task_id: TaskId,
    pub task: String,
}

impl TaskResult {
    pub fn new(worker: impl Into<String>, task: &Task) -> Self {
        Self {
            worker: worker.into(),
            task_id: task.id,
            task: task.label.clone(),
        }
    }
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} processed {}", self.worker, self.task)
    }
}
