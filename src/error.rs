use std::io;

use thiserror::Error;

use crate::models::task::{Command, TaskState};

/// A control command that is not valid in the task's current state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {command} a task that is {state}")]
pub struct TransitionError {
    pub command: Command,
    pub state: TaskState,
}

#[derive(Error, Debug)]
pub enum BusError {
    #[error("connect to {broker} failed: {reason}")]
    Connect { broker: String, reason: String },

    #[error("subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("not connected")]
    NotConnected,

    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("failed to start reconnect supervisor: {0}")]
    Supervisor(#[source] io::Error),

    #[error("invalid qos level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
