//! Lifecycle control for long-running worker tasks.
//!
//! A [`Task`] owns one worker thread gated by a mutex/condition-variable
//! monitor; a [`TaskManager`] broadcasts start, pause, resume and stop to
//! every task it holds. The [`bus`] module reports task events to a
//! publish/subscribe broker and accepts control messages from it.

pub mod app;
pub mod bus;
pub mod config;
pub mod error;
pub mod manager;
pub mod models;
pub mod worker;

pub use error::{BusError, ConfigError, TransitionError};
pub use manager::task_manager::TaskManager;
pub use models::{
    message::TaskEvent,
    task::{Command, TaskId, TaskState},
};
pub use worker::task::{Task, DEFAULT_WORK_UNIT};
