use std::{sync::Arc, time::Duration};

use super::config::{BusConfig, QoS};
use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub qos: QoS,
    pub retained: bool,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Called with a reason when an established connection drops without the
/// client asking for it.
pub type ConnectionLostHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Connection to a publish/subscribe broker.
///
/// Implementations report failures; retrying is the client's job.
pub trait Transport: Send {
    fn connect(&mut self, config: &BusConfig) -> Result<(), BusError>;

    fn subscribe(&mut self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<(), BusError>;

    fn publish(&mut self, message: Message) -> Result<(), BusError>;

    fn disconnect(&mut self, grace: Duration) -> Result<(), BusError>;

    fn is_connected(&self) -> bool;

    /// Installs the hook fired on an unrequested disconnect. It may run on
    /// any thread and must not block.
    fn set_connection_lost_handler(&mut self, handler: ConnectionLostHandler);
}

/// MQTT-style filter match: `+` matches one level, a trailing `#` matches
/// the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return filter_levels.next().is_none(),
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
