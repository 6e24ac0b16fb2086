use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use log::debug;

use super::config::{BusConfig, QoS};
use super::transport::{topic_matches, ConnectionLostHandler, Message, MessageHandler, Transport};
use crate::error::BusError;

/// Number of recent publishes kept for inspection by default.
pub const DEFAULT_LOG_CAPACITY: usize = 256;

struct Subscription {
    client_id: String,
    filter: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct BrokerState {
    connected: HashSet<String>,
    subscriptions: Vec<Subscription>,
    lost_handlers: HashMap<String, ConnectionLostHandler>,
    retained: HashMap<String, Message>,
    published: VecDeque<Message>,
    log_capacity: usize,
    fail_connects: u32,
    connect_attempts: u32,
}

/// In-process broker with topic wildcards and retained messages.
///
/// Handlers run on the publisher's thread, after the broker lock is released.
/// Only the most recent publishes are kept in the inspection log.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(log_capacity: usize) -> Self {
        let state = BrokerState {
            log_capacity,
            ..BrokerState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            client_id: None,
            on_lost: None,
        }
    }

    /// Makes the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().fail_connects = count;
    }

    /// Total connect attempts seen, failed ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    /// Forcibly disconnects a client, as a broker restart would. The client's
    /// connection-lost hook fires.
    pub fn drop_client(&self, client_id: &str) {
        let handler = self.remove_client(client_id);
        if let Some(handler) = handler {
            handler("dropped by broker");
        }
    }

    /// The most recent publishes, oldest first.
    pub fn published(&self) -> Vec<Message> {
        self.lock().published.iter().cloned().collect()
    }

    fn remove_client(&self, client_id: &str) -> Option<ConnectionLostHandler> {
        let mut state = self.lock();
        state.connected.remove(client_id);
        state.subscriptions.retain(|s| s.client_id != client_id);
        state.lost_handlers.remove(client_id)
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct MemoryTransport {
    broker: MemoryBroker,
    client_id: Option<String>,
    on_lost: Option<ConnectionLostHandler>,
}

impl Transport for MemoryTransport {
    fn connect(&mut self, config: &BusConfig) -> Result<(), BusError> {
        let mut state = self.broker.lock();
        state.connect_attempts += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(BusError::Connect {
                broker: config.broker_url(),
                reason: "connection refused".into(),
            });
        }
        // clean session: a reconnecting client starts without subscriptions
        state.subscriptions.retain(|s| s.client_id != config.client_id);
        state.connected.insert(config.client_id.clone());
        match &self.on_lost {
            Some(handler) => {
                state.lost_handlers.insert(config.client_id.clone(), Arc::clone(handler));
            }
            None => {
                state.lost_handlers.remove(&config.client_id);
            }
        }
        self.client_id = Some(config.client_id.clone());
        Ok(())
    }

    fn subscribe(&mut self, topic: &str, _qos: QoS, handler: MessageHandler) -> Result<(), BusError> {
        let client_id = self.connected_id().ok_or_else(|| BusError::Subscribe {
            topic: topic.to_string(),
            reason: "not connected".into(),
        })?;

        let retained: Vec<Message> = {
            let mut state = self.broker.lock();
            state.subscriptions.push(Subscription {
                client_id,
                filter: topic.to_string(),
                handler: Arc::clone(&handler),
            });
            state
                .retained
                .values()
                .filter(|m| topic_matches(topic, &m.topic))
                .cloned()
                .collect()
        };
        for message in &retained {
            handler(message);
        }
        Ok(())
    }

    fn publish(&mut self, message: Message) -> Result<(), BusError> {
        if self.connected_id().is_none() {
            return Err(BusError::NotConnected);
        }

        let handlers: Vec<MessageHandler> = {
            let mut state = self.broker.lock();
            if message.retained {
                if message.payload.is_empty() {
                    state.retained.remove(&message.topic);
                } else {
                    state.retained.insert(message.topic.clone(), message.clone());
                }
            }
            if state.log_capacity > 0 {
                if state.published.len() == state.log_capacity {
                    state.published.pop_front();
                }
                state.published.push_back(message.clone());
            }
            state
                .subscriptions
                .iter()
                .filter(|s| topic_matches(&s.filter, &message.topic))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        for handler in handlers {
            handler(&message);
        }
        Ok(())
    }

    fn disconnect(&mut self, grace: Duration) -> Result<(), BusError> {
        let Some(client_id) = self.client_id.take() else {
            return Err(BusError::NotConnected);
        };
        debug!("Client '{}' disconnecting (grace {:?}).", client_id, grace);
        // requested, so the lost hook stays quiet
        self.broker.remove_client(&client_id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected_id().is_some()
    }

    fn set_connection_lost_handler(&mut self, handler: ConnectionLostHandler) {
        self.on_lost = Some(handler);
    }
}

impl MemoryTransport {
    fn connected_id(&self) -> Option<String> {
        let id = self.client_id.as_ref()?;
        self.broker.lock().connected.contains(id).then(|| id.clone())
    }
}
