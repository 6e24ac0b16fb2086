use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, info};

use crate::models::{
    message::TaskEvent,
    task::{TaskId, TaskState},
};

/// Everything the monitor mutex guards.
pub(crate) struct Control {
    pub state: TaskState,
    pub worker: Option<JoinHandle<()>>,
    /// Set when a worker is spawned, cleared by the worker as its last act.
    pub alive: bool,
}

/// Mutex + condition variable shared by a task and its worker.
///
/// `wake` gates the worker on the task state; `exited` is where joiners
/// wait for `alive` to drop, so a resume never wakes a joiner instead of
/// the worker.
pub(crate) struct Monitor {
    control: Mutex<Control>,
    wake: Condvar,
    exited: Condvar,
    cycles: AtomicU64,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            control: Mutex::new(Control {
                state: TaskState::Idle,
                worker: None,
                alive: false,
            }),
            wake: Condvar::new(),
            exited: Condvar::new(),
            cycles: AtomicU64::new(0),
        }
    }

    // Control only holds a plain enum and a handle, so a poisoned lock still
    // carries a consistent value.
    pub fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_one(&self) {
        self.wake.notify_one();
    }

    pub fn notify_all(&self) {
        self.wake.notify_all();
    }

    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Blocks until the worker has run its exit path.
    pub fn wait_exited(&self) {
        let guard = self.lock();
        let _guard = self
            .exited
            .wait_while(guard, |control| control.alive)
            .unwrap_or_else(PoisonError::into_inner);
    }

    pub fn mark_exited(&self) {
        self.lock().alive = false;
        self.exited.notify_all();
    }

    /// Blocks while the task is paused. Returns false once it is stopped.
    fn wait_runnable(&self) -> bool {
        let guard = self.lock();
        let guard = self
            .wake
            .wait_while(guard, |control| control.state == TaskState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        guard.state != TaskState::Stopped
    }
}

// Called with the monitor held, so it must never block on a full channel.
pub(crate) fn emit(events: &Option<Sender<TaskEvent>>, event: TaskEvent) {
    let Some(sender) = events else {
        return;
    };
    match sender.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(event)) => debug!("Event channel full, dropped {:?}.", event),
    }
}

pub(crate) fn spawn_worker_thread(
    id: TaskId,
    monitor: Arc<Monitor>,
    work_unit: Duration,
    events: Option<Sender<TaskEvent>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("task-{}", id))
        .spawn(move || run_worker(id, &monitor, work_unit, &events))
}

fn run_worker(
    id: TaskId,
    monitor: &Monitor,
    work_unit: Duration,
    events: &Option<Sender<TaskEvent>>,
) {
    info!("Task '{}' worker started.", id);

    // The lock is released across the sleep; state is only checked between
    // work units, so a stop may take up to one unit to be observed.
    while monitor.wait_runnable() {
        thread::sleep(work_unit);
        let cycle = monitor.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Task '{}' completed work cycle {}.", id, cycle);
        emit(events, TaskEvent::WorkCompleted { id, cycle });
    }

    let cycles = monitor.cycles();
    info!("Task '{}' worker exited after {} cycles.", id, cycles);
    emit(events, TaskEvent::Exited { id, cycles });
    monitor.mark_exited();
}
