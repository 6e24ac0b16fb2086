use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::unbounded;
use taskctl::{app::demo::run_demo, Task, TaskEvent, TaskManager, TaskState};

const UNIT: Duration = Duration::from_millis(50);

fn cycles(manager: &TaskManager) -> Vec<u64> {
    manager.tasks().iter().map(|task| task.work_cycles()).collect()
}

#[test]
fn three_tasks_through_full_lifecycle() {
    let (tx, rx) = unbounded();
    let manager = TaskManager::new();
    for id in 1..=3 {
        manager.add_task(Arc::new(Task::with_work_unit(id, UNIT).with_events(tx.clone())));
    }
    drop(tx);

    manager.start_all();
    thread::sleep(UNIT * 3);
    assert!(manager.states().iter().all(|(_, s)| *s == TaskState::Running));
    assert!(cycles(&manager).iter().all(|&c| c >= 2), "{:?}", cycles(&manager));

    manager.pause_all();
    thread::sleep(UNIT * 3 / 2);
    let paused = cycles(&manager);
    thread::sleep(UNIT * 2);
    assert_eq!(cycles(&manager), paused);
    assert!(manager.states().iter().all(|(_, s)| *s == TaskState::Paused));

    manager.resume_all();
    thread::sleep(UNIT * 3);
    let resumed = cycles(&manager);
    assert!(resumed.iter().zip(&paused).all(|(now, before)| now > before));

    let started = Instant::now();
    manager.stop_all();
    // every worker is signalled before any is joined
    assert!(started.elapsed() < UNIT * 3, "stop_all took {:?}", started.elapsed());
    assert!(manager.states().iter().all(|(_, s)| *s == TaskState::Stopped));
    assert!(manager.tasks().iter().all(|task| !task.worker_alive()));

    let stopped = cycles(&manager);
    thread::sleep(UNIT);
    assert_eq!(cycles(&manager), stopped);

    let exited: Vec<_> = rx
        .try_iter()
        .filter_map(|event| match event {
            TaskEvent::Exited { id, .. } => Some(id),
            _ => None,
        })
        .collect();
    let mut sorted = exited.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, vec![1, 2, 3]);
}

#[test]
fn stopped_manager_ignores_further_broadcasts() {
    let manager = TaskManager::new();
    manager.add_task(Arc::new(Task::with_work_unit(1, UNIT)));
    manager.start_all();
    manager.stop_all();
    let before = cycles(&manager);

    manager.start_all();
    manager.resume_all();
    thread::sleep(UNIT * 2);

    assert_eq!(manager.states(), vec![(1, TaskState::Stopped)]);
    assert_eq!(cycles(&manager), before);
    assert!(!manager.tasks()[0].worker_alive());
}

#[test]
fn demo_reports_work_for_every_task() {
    let summary = run_demo(Duration::from_millis(10));
    let ids: Vec<_> = summary.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(summary.iter().all(|(_, cycles)| *cycles >= 3), "{:?}", summary);
}
