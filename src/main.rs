use std::{env, process, sync::Arc};

use crossbeam_channel::unbounded;
use log::{error, info};

use taskctl::app::cli::{self, CliContext};
use taskctl::app::logging;
use taskctl::bus::{bridge, client::BusClient, mqtt::MqttTransport};
use taskctl::config::AppConfig;
use taskctl::{Task, TaskManager};

fn main() {
    logging::init();

    let config = match env::args().nth(1) {
        Some(path) => match AppConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}: {}", path, e);
                process::exit(1);
            }
        },
        None => AppConfig::default(),
    };

    let manager = Arc::new(TaskManager::new());
    let mut events = None;
    let mut bus_client = None;

    if let Some(bus_config) = config.bus.clone() {
        info!("Connecting to {}.", bus_config.broker_url());
        let handler = bridge::command_handler(Arc::clone(&manager));
        match BusClient::connect(bus_config, MqttTransport::new(), handler) {
            Ok(client) => {
                let (tx, rx) = unbounded();
                if let Err(e) = bridge::forward_events(rx, client.clone(), "tasks".to_string()) {
                    error!("Failed to start event forwarder: {}", e);
                } else {
                    events = Some(tx);
                }
                bus_client = Some(client);
            }
            Err(e) => error!("Bus unavailable: {}", e),
        }
    }

    for &id in &config.tasks {
        let mut task = Task::with_work_unit(id, config.work_unit());
        if let Some(tx) = &events {
            task = task.with_events(tx.clone());
        }
        manager.add_task(Arc::new(task));
    }

    let context = CliContext {
        work_unit: config.work_unit(),
        events,
    };
    if let Err(e) = cli::run_cli(Arc::clone(&manager), context) {
        error!("Terminal error: {}", e);
        manager.stop_all();
    }

    if let Some(client) = bus_client {
        client.disconnect(client.config().disconnect_grace());
    }
    info!("Bye.");
}
