use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Caller-assigned task identifier. Uniqueness is not enforced.
pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Pause,
    Resume,
    Stop,
}

impl TaskState {
    /// Returns the state reached by applying `command`, or the rejection if
    /// the command is not valid here. Stop on a stopped task is accepted and
    /// leaves it stopped.
    pub fn apply(self, command: Command) -> Result<TaskState, TransitionError> {
        use Command::*;
        use TaskState::*;

        match (self, command) {
            (Idle, Start) => Ok(Running),
            (Running, Pause) => Ok(Paused),
            (Paused, Resume) => Ok(Running),
            (Running, Stop) | (Paused, Stop) | (Stopped, Stop) => Ok(Stopped),
            (state, command) => Err(TransitionError { command, state }),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Stopped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop => "stop",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Command::Start),
            "pause" => Ok(Command::Pause),
            "resume" => Ok(Command::Resume),
            "stop" => Ok(Command::Stop),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}
