use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::bus::config::BusConfig;
use crate::error::ConfigError;
use crate::models::task::TaskId;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Duration of one simulated work unit, in milliseconds.
    pub work_unit_ms: u64,
    /// Tasks created at startup.
    pub tasks: Vec<TaskId>,
    pub bus: Option<BusConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_unit_ms: 1000,
            tasks: vec![1, 2, 3],
            bus: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn work_unit(&self) -> Duration {
        Duration::from_millis(self.work_unit_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.work_unit_ms == 0 {
            return Err(ConfigError::Invalid("workUnitMs must be positive".into()));
        }
        if let Some(bus) = &self.bus {
            if bus.host.is_empty() {
                return Err(ConfigError::Invalid("bus.host must not be empty".into()));
            }
            if bus.topics().is_empty() {
                return Err(ConfigError::Invalid("bus.topic must name at least one topic".into()));
            }
        }
        Ok(())
    }
}
