use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, Sender};
use log::{debug, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS as MqttQoS};

use super::config::{BusConfig, QoS};
use super::transport::{topic_matches, ConnectionLostHandler, Message, MessageHandler, Transport};
use crate::error::BusError;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;

impl From<QoS> for MqttQoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => MqttQoS::AtMostOnce,
            QoS::AtLeastOnce => MqttQoS::AtLeastOnce,
            QoS::ExactlyOnce => MqttQoS::ExactlyOnce,
        }
    }
}

impl From<MqttQoS> for QoS {
    fn from(qos: MqttQoS) -> Self {
        match qos {
            MqttQoS::AtMostOnce => QoS::AtMostOnce,
            MqttQoS::AtLeastOnce => QoS::AtLeastOnce,
            MqttQoS::ExactlyOnce => QoS::ExactlyOnce,
        }
    }
}

/// State shared with one connection's event-loop thread. A reconnect
/// starts a fresh session, so a dying loop cannot touch the new one.
#[derive(Default)]
struct Session {
    connected: AtomicBool,
    closing: AtomicBool,
    subscriptions: Mutex<Vec<(String, MessageHandler)>>,
}

impl Session {
    fn dispatch(&self, message: &Message) {
        let handlers: Vec<MessageHandler> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(filter, _)| topic_matches(filter, &message.topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(message);
        }
    }
}

/// MQTT over TCP, driven by a `rumqttc` event loop on its own thread.
///
/// The loop stops at the first connection error and reports it through the
/// connection-lost hook; reconnecting is left to the bus client.
#[derive(Default)]
pub struct MqttTransport {
    client: Option<Client>,
    session: Option<Arc<Session>>,
    event_loop: Option<JoinHandle<()>>,
    on_lost: Option<ConnectionLostHandler>,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_session(&mut self) -> Result<(), BusError> {
        if let Some(session) = self.session.take() {
            session.closing.store(true, Ordering::SeqCst);
            session.connected.store(false, Ordering::SeqCst);
        }
        let result = match self.client.as_mut() {
            Some(client) => client
                .disconnect()
                .map_err(|e| BusError::Disconnect(e.to_string())),
            None => Err(BusError::NotConnected),
        };
        self.client = None;
        result
    }
}

impl Transport for MqttTransport {
    fn connect(&mut self, config: &BusConfig) -> Result<(), BusError> {
        if self.close_session().is_ok() {
            debug!("Replaced previous session for '{}'.", config.client_id);
        }
        self.event_loop = None;

        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        if !config.username.is_empty() {
            options.set_credentials(config.username.clone(), config.password.clone());
        }

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let session = Arc::new(Session::default());
        let (ready_tx, ready_rx) = bounded(1);
        let connect_error = |reason: String| BusError::Connect {
            broker: config.broker_url(),
            reason,
        };

        let handle = {
            let session = Arc::clone(&session);
            let on_lost = self.on_lost.clone();
            thread::Builder::new()
                .name(format!("mqtt-{}", config.client_id))
                .spawn(move || run_event_loop(connection, &session, ready_tx, on_lost))
                .map_err(|e| connect_error(e.to_string()))?
        };

        match ready_rx.recv_timeout(config.connect_timeout()) {
            Ok(Ok(())) => {
                self.client = Some(client);
                self.session = Some(session);
                self.event_loop = Some(handle);
                Ok(())
            }
            Ok(Err(reason)) => Err(connect_error(reason)),
            Err(_) => {
                session.closing.store(true, Ordering::SeqCst);
                drop(client);
                Err(connect_error("timed out waiting for CONNACK".to_string()))
            }
        }
    }

    fn subscribe(&mut self, topic: &str, qos: QoS, handler: MessageHandler) -> Result<(), BusError> {
        let subscribe_error = |reason: String| BusError::Subscribe {
            topic: topic.to_string(),
            reason,
        };
        let (Some(client), Some(session)) = (self.client.as_mut(), self.session.as_ref()) else {
            return Err(subscribe_error("not connected".to_string()));
        };
        client
            .subscribe(topic, qos.into())
            .map_err(|e| subscribe_error(e.to_string()))?;
        session
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_string(), handler));
        Ok(())
    }

    fn publish(&mut self, message: Message) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        let Some(client) = self.client.as_mut() else {
            return Err(BusError::NotConnected);
        };
        let topic = message.topic;
        client
            .publish(topic.clone(), message.qos.into(), message.retained, message.payload)
            .map_err(|e| BusError::Publish {
                topic,
                reason: e.to_string(),
            })
    }

    fn disconnect(&mut self, grace: Duration) -> Result<(), BusError> {
        let result = self.close_session();
        if let Some(handle) = self.event_loop.take() {
            let deadline = Instant::now() + grace;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                warn!("MQTT event loop still running after {:?}; detaching.", grace);
            }
        }
        result
    }

    fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.connected.load(Ordering::SeqCst))
    }

    fn set_connection_lost_handler(&mut self, handler: ConnectionLostHandler) {
        self.on_lost = Some(handler);
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        let _ = self.close_session();
    }
}

fn run_event_loop(
    mut connection: Connection,
    session: &Session,
    ready: Sender<Result<(), String>>,
    on_lost: Option<ConnectionLostHandler>,
) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                session.connected.store(true, Ordering::SeqCst);
                let _ = ready.try_send(Ok(()));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = Message {
                    topic: publish.topic,
                    qos: publish.qos.into(),
                    retained: publish.retain,
                    payload: publish.payload.to_vec(),
                };
                session.dispatch(&message);
            }
            Ok(_) => {}
            Err(e) => {
                let was_connected = session.connected.swap(false, Ordering::SeqCst);
                if session.closing.load(Ordering::SeqCst) {
                    break;
                }
                let reason = e.to_string();
                if was_connected {
                    if let Some(handler) = &on_lost {
                        handler(&reason);
                    }
                } else {
                    let _ = ready.try_send(Err(reason));
                }
                break;
            }
        }
    }
    debug!("MQTT event loop finished.");
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn qos_maps_both_ways() {
        for qos in [QoS::AtMostOnce, QoS::AtLeastOnce, QoS::ExactlyOnce] {
            assert_eq!(QoS::from(MqttQoS::from(qos)), qos);
        }
    }

    #[test]
    fn unreachable_broker_fails_to_connect() {
        // grab a free port, then close it so nothing is listening
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .unwrap();
        let config = BusConfig {
            client_id: "unreachable".into(),
            host: "127.0.0.1".into(),
            port,
            connect_timeout_ms: 2_000,
            ..BusConfig::default()
        };

        let mut transport = MqttTransport::new();
        assert!(matches!(transport.connect(&config), Err(BusError::Connect { .. })));
        assert!(!transport.is_connected());
    }

    #[test]
    fn publish_without_connection_is_refused() {
        let mut transport = MqttTransport::new();
        let message = Message {
            topic: "t".into(),
            qos: QoS::AtMostOnce,
            retained: false,
            payload: Vec::new(),
        };
        assert!(matches!(transport.publish(message), Err(BusError::NotConnected)));
        let handler: MessageHandler = Arc::new(|_: &Message| {});
        assert!(transport.subscribe("t", QoS::AtMostOnce, handler).is_err());
    }
}
