use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use crossbeam_channel::Sender;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal,
};

use super::demo::run_demo;
use crate::manager::task_manager::TaskManager;
use crate::models::{
    message::TaskEvent,
    task::{Command, TaskId},
};
use crate::worker::task::Task;

const HELP: &str = "Commands: add <id> | start|pause|resume|stop [id] | status <id> | list | demo | help | exit";

/// Settings the front end applies to tasks it creates.
pub struct CliContext {
    pub work_unit: Duration,
    pub events: Option<Sender<TaskEvent>>,
}

pub fn run_cli(manager: Arc<TaskManager>, context: CliContext) -> io::Result<()> {
    println!("Task controller started. Enter a command or 'exit' to quit.");
    println!("{}", HELP);

    terminal::enable_raw_mode()?;
    let result = command_loop(&manager, &context);
    terminal::disable_raw_mode()?;
    result
}

fn command_loop(manager: &TaskManager, context: &CliContext) -> io::Result<()> {
    let mut history: Vec<String> = Vec::new();

    loop {
        let Some(input) = read_line(&history)? else {
            continue;
        };
        history.push(input.clone());

        let mut args = input.split_whitespace();
        match args.next() {
            Some("add") => match parse_id(args.next()) {
                Ok(id) => {
                    let mut task = Task::with_work_unit(id, context.work_unit);
                    if let Some(events) = &context.events {
                        task = task.with_events(events.clone());
                    }
                    manager.add_task(Arc::new(task));
                    println!("\rAdded task {}", id);
                }
                Err(msg) => println!("\r{}", msg),
            },
            Some(word @ ("start" | "pause" | "resume" | "stop")) => {
                let command: Command = match word.parse() {
                    Ok(command) => command,
                    Err(msg) => {
                        println!("\r{}", msg);
                        continue;
                    }
                };
                match args.next() {
                    None => {
                        manager.broadcast(command);
                        println!("\rSent {} to all {} tasks", command, manager.len());
                    }
                    Some(raw) => match parse_id(Some(raw)) {
                        Ok(id) if manager.send(id, command) => println!("\rSent {} to task {}", command, id),
                        Ok(id) => println!("\rTask {} not found", id),
                        Err(msg) => println!("\r{}", msg),
                    },
                }
            }
            Some("status") => match parse_id(args.next()) {
                Ok(id) => match manager.get(id) {
                    Some(task) => println!(
                        "\rTask {} status: {} ({} cycles)",
                        id,
                        task.state(),
                        task.work_cycles()
                    ),
                    None => println!("\rTask {} not found", id),
                },
                Err(msg) => println!("\r{}", msg),
            },
            Some("list") => {
                let tasks = manager.tasks();
                if tasks.is_empty() {
                    println!("\rNo tasks");
                } else {
                    println!("\r{}\t {} \t {}", "ID", "State", "Cycles");
                    println!("\r{}", "-".repeat(40));
                    for task in tasks {
                        println!("\r{}\t {} \t {}", task.id(), task.state(), task.work_cycles());
                    }
                }
            }
            Some("demo") => {
                terminal::disable_raw_mode()?;
                let summary = run_demo(context.work_unit);
                terminal::enable_raw_mode()?;
                for (id, cycles) in summary {
                    println!("\rDemo task {} finished after {} cycles", id, cycles);
                }
            }
            Some("help") => println!("\r{}", HELP),
            Some("exit") => {
                println!("\rStopping all tasks and exiting...");
                manager.stop_all();
                return Ok(());
            }
            Some(cmd) => println!("\rUnknown command: {}. Type 'help' for commands.", cmd),
            None => continue,
        }
    }
}

/// Reads one line with Up/Down history navigation. Returns `None` for a
/// blank line.
fn read_line(history: &[String]) -> io::Result<Option<String>> {
    let mut history_index = history.len();
    let mut input = String::new();
    print!("\r>>> ");
    io::stdout().flush()?;

    loop {
        let Event::Key(key_event) = event::read()? else {
            continue;
        };
        if key_event.kind != KeyEventKind::Press {
            continue;
        }
        match key_event.code {
            KeyCode::Enter => {
                println!();
                let line = input.trim().to_string();
                return Ok((!line.is_empty()).then_some(line));
            }
            KeyCode::Up => {
                history_index = history_index.saturating_sub(1);
                if let Some(command) = history.get(history_index) {
                    input = command.clone();
                    redraw(&input)?;
                }
            }
            KeyCode::Down => {
                history_index = (history_index + 1).min(history.len());
                input = history.get(history_index).cloned().unwrap_or_default();
                redraw(&input)?;
            }
            KeyCode::Char(c) => {
                input.push(c);
                print!("{}", c);
                io::stdout().flush()?;
            }
            KeyCode::Backspace => {
                input.pop();
                redraw(&input)?;
            }
            _ => {}
        }
    }
}

fn redraw(input: &str) -> io::Result<()> {
    execute!(
        io::stdout(),
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )?;
    print!(">>> {}", input);
    io::stdout().flush()
}

fn parse_id(raw: Option<&str>) -> Result<TaskId, String> {
    let raw = raw.ok_or_else(|| "Task ID must be specified.".to_string())?;
    raw.parse::<TaskId>()
        .map_err(|_| format!("Invalid task ID format: {}", raw))
}
