use std::{fmt, time::Duration};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::BusError;

/// Delivery guarantee level. Higher levels cost more latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = BusError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(BusError::InvalidQos(other)),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Connection settings for the message bus.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BusConfig {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub host: String,
    #[serde(deserialize_with = "port_from_any")]
    pub port: u16,
    /// Comma-separated list of topics to subscribe to.
    pub topic: String,
    pub qos: QoS,
    pub connect_retry_ms: u64,
    /// How long a single connect attempt may wait for the broker's answer.
    pub connect_timeout_ms: u64,
    /// `None` retries forever.
    pub connect_attempts: Option<u32>,
    pub reconnect_retry_ms: u64,
    pub reconnect_attempts: u32,
    pub disconnect_grace_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            client_id: "taskctl".to_string(),
            host: "localhost".to_string(),
            port: 1883,
            topic: String::new(),
            qos: QoS::AtMostOnce,
            connect_retry_ms: 5_000,
            connect_timeout_ms: 10_000,
            connect_attempts: None,
            reconnect_retry_ms: 1_000,
            reconnect_attempts: 5,
            disconnect_grace_ms: 30_000,
        }
    }
}

impl BusConfig {
    pub fn broker_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }

    /// Topic list with surrounding whitespace and empty entries dropped.
    pub fn topics(&self) -> Vec<&str> {
        self.topic
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .collect()
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_retry_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }
}

// Ports show up both as "1883" and 1883 in existing config files.
fn port_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_split_and_trimmed() {
        let config = BusConfig {
            topic: "a/b, c ,,d/#".into(),
            ..BusConfig::default()
        };
        assert_eq!(config.topics(), vec!["a/b", "c", "d/#"]);
        assert!(BusConfig::default().topics().is_empty());
    }

    #[test]
    fn port_accepts_number_or_string() {
        let a: BusConfig = serde_json::from_str(r#"{"port": 8883}"#).unwrap();
        let b: BusConfig = serde_json::from_str(r#"{"port": "8883"}"#).unwrap();
        assert_eq!(a.port, 8883);
        assert_eq!(b.port, 8883);
        assert!(serde_json::from_str::<BusConfig>(r#"{"port": "eighty"}"#).is_err());
    }

    #[test]
    fn defaults_match_retry_contract() {
        let config = BusConfig::default();
        assert_eq!(config.connect_delay(), Duration::from_secs(5));
        assert_eq!(config.connect_attempts, None);
        assert_eq!(config.reconnect_attempts, 5);
        assert_eq!(config.disconnect_grace(), Duration::from_secs(30));
        assert_eq!(config.broker_url(), "tcp://localhost:1883");
    }

    #[test]
    fn qos_levels() {
        assert_eq!(QoS::try_from(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(QoS::try_from(3), Err(BusError::InvalidQos(3))));
        assert_eq!(serde_json::to_string(&QoS::AtLeastOnce).unwrap(), "1");
    }
}
