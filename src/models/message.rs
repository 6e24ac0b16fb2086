use serde::{Deserialize, Serialize};

use super::task::{Command, TaskId, TaskState};

/// Lifecycle notifications emitted by a task and its worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Started { id: TaskId },
    Paused { id: TaskId },
    Resumed { id: TaskId },
    StopRequested { id: TaskId },
    Exited { id: TaskId, cycles: u64 },
    WorkCompleted { id: TaskId, cycle: u64 },
    Rejected { id: TaskId, command: Command, state: TaskState },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Started { id }
            | TaskEvent::Paused { id }
            | TaskEvent::Resumed { id }
            | TaskEvent::StopRequested { id }
            | TaskEvent::Exited { id, .. }
            | TaskEvent::WorkCompleted { id, .. }
            | TaskEvent::Rejected { id, .. } => *id,
        }
    }
}
