use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use crate::models::task::{Command, TaskId, TaskState};
use crate::worker::task::Task;

/// Ordered collection of tasks with broadcast controls.
///
/// Broadcasts run on the caller's thread in registration order and return
/// once every task has been told, not once every worker has reacted.
/// `stop_all` is the exception: it also waits for the workers to exit.
#[derive(Default)]
pub struct TaskManager {
    tasks: Mutex<Vec<Arc<Task>>>,
}

impl TaskManager {
    pub fn new() -> Self {
        TaskManager {
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_task(&self, task: Arc<Task>) {
        let id = task.id();
        self.lock().push(task);
        info!("Task '{}' added.", id);
    }

    pub fn start_all(&self) {
        self.broadcast(Command::Start);
    }

    pub fn pause_all(&self) {
        self.broadcast(Command::Pause);
    }

    pub fn resume_all(&self) {
        self.broadcast(Command::Resume);
    }

    /// Signals every task to stop, then waits for each worker in turn.
    pub fn stop_all(&self) {
        self.broadcast(Command::Stop);
    }

    pub fn broadcast(&self, command: Command) {
        let tasks = self.lock();
        info!("Broadcasting '{}' to {} tasks.", command, tasks.len());
        match command {
            Command::Start => tasks.iter().for_each(|task| task.start()),
            Command::Pause => tasks.iter().for_each(|task| task.pause()),
            Command::Resume => tasks.iter().for_each(|task| task.resume()),
            Command::Stop => {
                for task in tasks.iter() {
                    task.request_stop();
                }
                for task in tasks.iter() {
                    task.join();
                }
            }
        }
    }

    pub fn start_task(&self, id: TaskId) -> bool {
        self.send(id, Command::Start)
    }

    pub fn pause_task(&self, id: TaskId) -> bool {
        self.send(id, Command::Pause)
    }

    pub fn resume_task(&self, id: TaskId) -> bool {
        self.send(id, Command::Resume)
    }

    pub fn stop_task(&self, id: TaskId) -> bool {
        self.send(id, Command::Stop)
    }

    /// Applies `command` to the first task registered under `id`.
    /// Returns false if there is none.
    pub fn send(&self, id: TaskId, command: Command) -> bool {
        let Some(task) = self.get(id) else {
            warn!("Task '{}' not found.", id);
            return false;
        };
        match command {
            Command::Start => task.start(),
            Command::Pause => task.pause(),
            Command::Resume => task.resume(),
            Command::Stop => task.stop(),
        }
        true
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<Task>> {
        self.lock().iter().find(|task| task.id() == id).cloned()
    }

    pub fn get_task_state(&self, id: TaskId) -> Option<TaskState> {
        self.get(id).map(|task| task.state())
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.lock().clone()
    }

    pub fn states(&self) -> Vec<(TaskId, TaskState)> {
        self.lock().iter().map(|task| (task.id(), task.state())).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Task>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam_channel::{unbounded, Receiver};

    use super::*;
    use crate::models::message::TaskEvent;

    const UNIT: Duration = Duration::from_millis(20);

    fn manager_with(ids: &[TaskId]) -> (TaskManager, Receiver<TaskEvent>) {
        let (tx, rx) = unbounded();
        let manager = TaskManager::new();
        for &id in ids {
            manager.add_task(Arc::new(Task::with_work_unit(id, UNIT).with_events(tx.clone())));
        }
        (manager, rx)
    }

    fn ids_of<F>(rx: &Receiver<TaskEvent>, pick: F) -> Vec<TaskId>
    where
        F: Fn(&TaskEvent) -> bool,
    {
        rx.try_iter().filter(|e| pick(e)).map(|e| e.task_id()).collect()
    }

    #[test]
    fn new_manager_is_empty() {
        let manager = TaskManager::new();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert!(manager.get(1).is_none());
    }

    #[test]
    fn broadcasts_reach_every_task_in_order() {
        let (manager, rx) = manager_with(&[3, 1, 2]);

        manager.start_all();
        assert_eq!(ids_of(&rx, |e| matches!(e, TaskEvent::Started { .. })), vec![3, 1, 2]);

        manager.pause_all();
        assert_eq!(ids_of(&rx, |e| matches!(e, TaskEvent::Paused { .. })), vec![3, 1, 2]);

        manager.resume_all();
        assert_eq!(ids_of(&rx, |e| matches!(e, TaskEvent::Resumed { .. })), vec![3, 1, 2]);

        manager.stop_all();
        let events: Vec<_> = rx.try_iter().collect();
        let requested: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::StopRequested { .. }))
            .map(TaskEvent::task_id)
            .collect();
        assert_eq!(requested, vec![3, 1, 2]);
        let exited = events.iter().filter(|e| matches!(e, TaskEvent::Exited { .. })).count();
        assert_eq!(exited, 3);
    }

    #[test]
    fn stop_all_stops_paused_and_running_tasks() {
        let (manager, _rx) = manager_with(&[1, 2]);
        manager.start_all();
        manager.pause_task(2);
        manager.stop_all();

        assert_eq!(
            manager.states(),
            vec![(1, TaskState::Stopped), (2, TaskState::Stopped)]
        );
        assert!(manager.tasks().iter().all(|task| !task.worker_alive()));
    }

    #[test]
    fn duplicate_ids_are_kept() {
        let (manager, _rx) = manager_with(&[5, 5]);
        assert_eq!(manager.len(), 2);
        manager.start_all();
        assert!(manager.tasks().iter().all(|task| task.state() == TaskState::Running));
        manager.stop_all();
    }

    #[test]
    fn per_id_commands() {
        let (manager, _rx) = manager_with(&[1, 2]);
        assert!(manager.start_task(2));
        assert!(!manager.start_task(9));
        assert_eq!(manager.get_task_state(1), Some(TaskState::Idle));
        assert_eq!(manager.get_task_state(2), Some(TaskState::Running));
        assert_eq!(manager.get_task_state(9), None);

        assert!(manager.stop_task(2));
        assert_eq!(manager.get_task_state(2), Some(TaskState::Stopped));
    }

    #[test]
    fn misuse_is_ignored() {
        let (manager, rx) = manager_with(&[1]);
        manager.pause_all();
        manager.resume_all();
        manager.stop_all();
        assert_eq!(manager.get_task_state(1), Some(TaskState::Idle));
        let rejected = rx
            .try_iter()
            .filter(|e| matches!(e, TaskEvent::Rejected { .. }))
            .count();
        assert_eq!(rejected, 3);
    }
}
