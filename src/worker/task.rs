use std::{sync::Arc, time::Duration};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use super::worker::{emit, spawn_worker_thread, Monitor};
use crate::error::TransitionError;
use crate::models::{
    message::TaskEvent,
    task::{Command, TaskId, TaskState},
};

pub const DEFAULT_WORK_UNIT: Duration = Duration::from_secs(1);

/// A unit of repeated work driven by one dedicated worker thread.
///
/// Control commands never fail: a command that does not fit the current
/// state is logged, reported as [`TaskEvent::Rejected`] and ignored.
pub struct Task {
    id: TaskId,
    work_unit: Duration,
    monitor: Arc<Monitor>,
    events: Option<Sender<TaskEvent>>,
}

impl Task {
    pub fn new(id: TaskId) -> Self {
        Self::with_work_unit(id, DEFAULT_WORK_UNIT)
    }

    pub fn with_work_unit(id: TaskId, work_unit: Duration) -> Self {
        Self {
            id,
            work_unit,
            monitor: Arc::new(Monitor::new()),
            events: None,
        }
    }

    /// Routes lifecycle events for this task to `sender`.
    pub fn with_events(mut self, sender: Sender<TaskEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn work_unit(&self) -> Duration {
        self.work_unit
    }

    pub fn state(&self) -> TaskState {
        self.monitor.lock().state
    }

    /// Number of work units the worker has completed so far.
    pub fn work_cycles(&self) -> u64 {
        self.monitor.cycles()
    }

    /// True from a successful start until the worker has finished exiting.
    pub fn worker_alive(&self) -> bool {
        self.monitor.lock().alive
    }

    pub fn start(&self) {
        let mut control = self.monitor.lock();
        let Some(next) = self.transition(control.state, Command::Start) else {
            return;
        };
        control.state = next;

        let spawned = spawn_worker_thread(
            self.id,
            Arc::clone(&self.monitor),
            self.work_unit,
            self.events.clone(),
        );
        match spawned {
            Ok(handle) => {
                control.worker = Some(handle);
                control.alive = true;
                info!("Task '{}' started.", self.id);
                emit(&self.events, TaskEvent::Started { id: self.id });
            }
            Err(e) => {
                control.state = TaskState::Idle;
                error!("Failed to spawn worker for task '{}': {}", self.id, e);
            }
        }
    }

    pub fn pause(&self) {
        let mut control = self.monitor.lock();
        let Some(next) = self.transition(control.state, Command::Pause) else {
            return;
        };
        // the worker sees this on its next check, no wakeup needed
        control.state = next;
        info!("Task '{}' paused.", self.id);
        emit(&self.events, TaskEvent::Paused { id: self.id });
    }

    pub fn resume(&self) {
        let mut control = self.monitor.lock();
        let Some(next) = self.transition(control.state, Command::Resume) else {
            return;
        };
        control.state = next;
        self.monitor.notify_one();
        info!("Task '{}' resumed.", self.id);
        emit(&self.events, TaskEvent::Resumed { id: self.id });
    }

    /// Stops the task and waits for its worker to exit.
    ///
    /// Works from both running and paused. Stopping a stopped task does
    /// nothing; stopping an idle task is rejected.
    pub fn stop(&self) {
        self.request_stop();
        self.join();
    }

    /// Marks the task stopped and wakes the worker without waiting for it.
    /// Returns true if this call performed the transition.
    pub fn request_stop(&self) -> bool {
        let mut control = self.monitor.lock();
        if control.state.is_terminal() {
            debug!("Task '{}' is already stopped.", self.id);
            return false;
        }
        let Some(next) = self.transition(control.state, Command::Stop) else {
            return false;
        };
        control.state = next;
        self.monitor.notify_all();
        info!("Task '{}' is being stopped.", self.id);
        emit(&self.events, TaskEvent::StopRequested { id: self.id });
        true
    }

    /// Waits for the worker to exit, if there is one.
    ///
    /// Only one caller gets the thread handle; any other concurrent caller
    /// waits on the monitor until the worker has run its exit path.
    pub fn join(&self) {
        // take the handle first: joining under the monitor would deadlock
        // against the worker's own wait
        let handle = self.monitor.lock().worker.take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Worker for task '{}' panicked.", self.id);
                    self.monitor.mark_exited();
                }
            }
            None => self.monitor.wait_exited(),
        }
    }

    fn transition(&self, state: TaskState, command: Command) -> Option<TaskState> {
        match state.apply(command) {
            Ok(next) => Some(next),
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    fn reject(&self, e: TransitionError) {
        warn!("Task '{}': {}.", self.id, e);
        emit(
            &self.events,
            TaskEvent::Rejected {
                id: self.id,
                command: e.command,
                state: e.state,
            },
        );
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        let handle = {
            let mut control = self.monitor.lock();
            if matches!(control.state, TaskState::Running | TaskState::Paused) {
                control.state = TaskState::Stopped;
                self.monitor.notify_all();
            }
            control.worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}
