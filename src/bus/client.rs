use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    thread,
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver};
use log::{debug, error, info, warn};

use super::config::{BusConfig, QoS};
use super::transport::{Message, MessageHandler, Transport};
use crate::error::BusError;

struct Inner<T> {
    transport: T,
    config: BusConfig,
    handler: MessageHandler,
    closed: bool,
}

/// Bus connection that retries on connect and reconnects on its own when
/// the transport reports a lost connection.
///
/// Cloning gives another handle to the same connection.
pub struct BusClient<T: Transport> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Transport> Clone for BusClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport + 'static> BusClient<T> {
    /// Connects, retrying with a fixed delay, then subscribes to every
    /// configured topic. Inbound messages go to `callback`.
    ///
    /// Retries forever unless `connect_attempts` is set, in which case it
    /// fails with [`BusError::RetriesExhausted`] after that many attempts.
    pub fn connect<F>(config: BusConfig, mut transport: T, callback: F) -> Result<Self, BusError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let (lost_tx, lost_rx) = unbounded::<String>();
        transport.set_connection_lost_handler(Arc::new(move |reason: &str| {
            let _ = lost_tx.send(reason.to_string());
        }));

        let mut inner = Inner {
            transport,
            config,
            handler: Arc::new(callback),
            closed: false,
        };
        inner.connect_with_retry()?;
        inner.subscribe_all();

        let inner = Arc::new(Mutex::new(inner));
        let weak = Arc::downgrade(&inner);
        thread::Builder::new()
            .name("bus-reconnect".to_string())
            .spawn(move || supervise(weak, lost_rx))
            .map_err(BusError::Supervisor)?;

        Ok(BusClient { inner })
    }
}

impl<T: Transport> BusClient<T> {
    pub fn config(&self) -> BusConfig {
        self.lock().config.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().transport.is_connected()
    }

    /// Fire-and-forget publish. Failures are logged, not returned.
    pub fn publish(&self, topic: &str, qos: QoS, retained: bool, payload: impl Into<Vec<u8>>) {
        let message = Message {
            topic: topic.to_string(),
            qos,
            retained,
            payload: payload.into(),
        };
        if let Err(e) = self.lock().transport.publish(message) {
            warn!("Bus publish dropped: {}", e);
        }
    }

    /// Publishes at QoS 0, not retained.
    pub fn publish_default(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.publish(topic, QoS::AtMostOnce, false, payload);
    }

    pub fn disconnect(&self, grace: Duration) {
        let mut inner = self.lock();
        inner.closed = true;
        let url = inner.config.broker_url();
        match inner.transport.disconnect(grace) {
            Ok(()) => info!("Disconnected from {}.", url),
            Err(e) => warn!("Disconnect from {} failed: {}", url, e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Inner<T> {
    fn connect_with_retry(&mut self) -> Result<(), BusError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.transport.connect(&self.config) {
                Ok(()) => {
                    info!("Connected to {} as '{}'.", self.config.broker_url(), self.config.client_id);
                    return Ok(());
                }
                Err(e) => {
                    error!("Connect attempt {} failed: {}", attempt, e);
                    if self.config.connect_attempts.is_some_and(|max| attempt >= max) {
                        return Err(BusError::RetriesExhausted { attempts: attempt });
                    }
                    thread::sleep(self.config.connect_delay());
                }
            }
        }
    }

    /// Bounded reconnect after a lost connection. Returns false if every
    /// attempt failed.
    fn reconnect(&mut self, reason: &str) -> bool {
        warn!("Bus connection lost: {}", reason);
        let attempts = self.config.reconnect_attempts;
        for attempt in 1..=attempts {
            match self.transport.connect(&self.config) {
                Ok(()) => {
                    info!("Reconnected to {} on attempt {}.", self.config.broker_url(), attempt);
                    self.subscribe_all();
                    return true;
                }
                Err(e) => {
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        thread::sleep(self.config.reconnect_delay());
                    }
                }
            }
        }
        error!("Giving up on {} after {} reconnect attempts.", self.config.broker_url(), attempts);
        false
    }

    fn subscribe_all(&mut self) {
        let qos = self.config.qos;
        let topics: Vec<String> = self.config.topics().into_iter().map(String::from).collect();
        for topic in topics {
            match self.transport.subscribe(&topic, qos, Arc::clone(&self.handler)) {
                Ok(()) => info!("Subscribed to '{}' at qos {}.", topic, qos),
                Err(e) => error!("{}", e),
            }
        }
    }
}

// Ends when the client is dropped (the transport, and with it the sender
// side of `lost`, goes away) or disconnected.
fn supervise<T: Transport>(inner: Weak<Mutex<Inner<T>>>, lost: Receiver<String>) {
    for reason in lost.iter() {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            break;
        }
        if inner.transport.is_connected() {
            debug!("Ignoring stale connection-lost notice: {}", reason);
            continue;
        }
        inner.reconnect(&reason);
    }
    debug!("Reconnect supervisor finished.");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::bus::memory::MemoryBroker;

    fn fast_config(client_id: &str, topic: &str) -> BusConfig {
        BusConfig {
            client_id: client_id.into(),
            topic: topic.into(),
            connect_retry_ms: 1,
            reconnect_retry_ms: 1,
            ..BusConfig::default()
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn connect_retries_until_broker_accepts() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(3);

        let client = BusClient::connect(fast_config("test", "a"), broker.transport(), |_| {}).unwrap();
        assert!(client.is_connected());
        assert_eq!(broker.connect_attempts(), 4);
    }

    #[test]
    fn capped_connect_gives_up() {
        let broker = MemoryBroker::new();
        broker.fail_next_connects(10);
        let config = BusConfig {
            connect_attempts: Some(2),
            ..fast_config("test", "a")
        };

        let result = BusClient::connect(config, broker.transport(), |_| {});
        assert!(matches!(result, Err(BusError::RetriesExhausted { attempts: 2 })));
    }

    #[test]
    fn subscribes_every_topic_and_delivers() {
        let broker = MemoryBroker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _client = BusClient::connect(fast_config("test", "a, b"), broker.transport(), move |m: &Message| {
            sink.lock().unwrap().push(m.topic.clone());
        })
        .unwrap();

        let other = BusClient::connect(fast_config("other", ""), broker.transport(), |_| {}).unwrap();
        other.publish_default("b", "x");
        other.publish("a", QoS::ExactlyOnce, false, "y");
        other.publish_default("c", "z");

        assert_eq!(*seen.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn dropped_client_reconnects_by_itself() {
        let broker = MemoryBroker::new();
        let seen = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&seen);
        let client = BusClient::connect(fast_config("test", "a"), broker.transport(), move |_| {
            *sink.lock().unwrap() += 1;
        })
        .unwrap();

        broker.fail_next_connects(2);
        broker.drop_client("test");
        assert!(wait_until(|| client.is_connected()));
        // initial connect, two refusals, one success
        assert_eq!(broker.connect_attempts(), 4);

        let other = BusClient::connect(fast_config("other", ""), broker.transport(), |_| {}).unwrap();
        other.publish_default("a", "ping");
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn reconnect_gives_up_after_five_attempts() {
        let broker = MemoryBroker::new();
        let client = BusClient::connect(fast_config("test", "a"), broker.transport(), |_| {}).unwrap();
        broker.fail_next_connects(100);
        let before = broker.connect_attempts();
        broker.drop_client("test");

        assert!(wait_until(|| broker.connect_attempts() - before == 5));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(broker.connect_attempts() - before, 5);
        assert!(!client.is_connected());
    }

    #[test]
    fn requested_disconnect_does_not_reconnect() {
        let broker = MemoryBroker::new();
        let client = BusClient::connect(fast_config("test", ""), broker.transport(), |_| {}).unwrap();
        client.disconnect(Duration::from_millis(10));
        thread::sleep(Duration::from_millis(50));
        assert!(!client.is_connected());
        assert_eq!(broker.connect_attempts(), 1);
    }

    #[test]
    fn publish_while_disconnected_is_dropped() {
        let broker = MemoryBroker::new();
        let client = BusClient::connect(fast_config("other", ""), broker.transport(), |_| {}).unwrap();
        client.disconnect(Duration::from_millis(10));
        client.publish_default("a", "lost");
        assert!(broker.published().is_empty());
    }
}
