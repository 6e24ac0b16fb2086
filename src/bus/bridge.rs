use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::Receiver;
use log::{error, info, warn};

use super::client::BusClient;
use super::transport::{Message, Transport};
use crate::manager::task_manager::TaskManager;
use crate::models::{
    message::TaskEvent,
    task::{Command, TaskId},
};

pub fn event_topic(prefix: &str, id: TaskId) -> String {
    format!("{}/{}/events", prefix, id)
}

/// Publishes every event from `events` as JSON to `<prefix>/<id>/events`.
/// The thread ends once all event senders are dropped.
pub fn forward_events<T>(
    events: Receiver<TaskEvent>,
    client: BusClient<T>,
    prefix: String,
) -> io::Result<JoinHandle<()>>
where
    T: Transport + 'static,
{
    thread::Builder::new()
        .name("event-forwarder".to_string())
        .spawn(move || {
            for event in events.iter() {
                let payload = match serde_json::to_vec(&event) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Failed to encode {:?}: {}", event, e);
                        continue;
                    }
                };
                let topic = event_topic(&prefix, event.task_id());
                client.publish_default(&topic, payload);
            }
            info!("Event forwarder finished.");
        })
}

/// Builds a message callback that turns control payloads into manager calls.
///
/// `pause` broadcasts to every task; `pause 2` targets task 2. The same
/// goes for `start`, `resume` and `stop`.
pub fn command_handler(manager: Arc<TaskManager>) -> impl Fn(&Message) + Send + Sync + 'static {
    move |message: &Message| {
        let Some(text) = message.payload_str() else {
            warn!("Ignoring non-UTF-8 payload on '{}'.", message.topic);
            return;
        };
        match parse_control(text) {
            Ok((command, None)) => manager.broadcast(command),
            Ok((command, Some(id))) => {
                manager.send(id, command);
            }
            Err(e) => warn!("Ignoring control message on '{}': {}", message.topic, e),
        }
    }
}

pub fn parse_control(text: &str) -> Result<(Command, Option<TaskId>), String> {
    let mut parts = text.split_whitespace();
    let command: Command = parts.next().ok_or("empty control message")?.parse()?;
    let id = match parts.next() {
        Some(raw) => Some(
            raw.parse::<TaskId>()
                .map_err(|_| format!("invalid task id '{}'", raw))?,
        ),
        None => None,
    };
    if parts.next().is_some() {
        return Err(format!("unexpected trailing input in '{}'", text.trim()));
    }
    Ok((command, id))
}
