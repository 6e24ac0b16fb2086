use std::{sync::Arc, thread, time::Duration};

use log::info;

use crate::manager::task_manager::TaskManager;
use crate::models::task::TaskId;
use crate::worker::task::Task;

/// Runs three fresh tasks through start, pause, resume and stop, sleeping
/// in whole work units between steps. Returns each task's final cycle count.
pub fn run_demo(work_unit: Duration) -> Vec<(TaskId, u64)> {
    let manager = TaskManager::new();
    for id in 1..=3 {
        manager.add_task(Arc::new(Task::with_work_unit(id, work_unit)));
    }

    manager.start_all();
    thread::sleep(work_unit * 3);

    manager.pause_all();
    thread::sleep(work_unit * 2);

    manager.resume_all();
    thread::sleep(work_unit * 3);

    manager.stop_all();
    info!("Demo finished: {:?}", manager.states());

    manager
        .tasks()
        .iter()
        .map(|task| (task.id(), task.work_cycles()))
        .collect()
}
