//! Agent configuration, loadable from TOML.

use std::time::Duration;

use serde::Deserialize;

use vl_publish::MqttConfig;

use crate::connection::ConnectionConfig;
use crate::scheduler::SchedulerConfig;

/// Top-level configuration for the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Identifier used in publish topics.
    pub device_id: String,
    /// BLE discovery and connect settings.
    #[serde(default)]
    pub ble: BleConfig,
    /// Collection loop settings.
    #[serde(default)]
    pub collection: CollectionConfig,
    /// MQTT broker settings. None disables publishing.
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
    /// Where to persist the last known adapter id. None keeps it in
    /// memory only.
    #[serde(default)]
    pub device_store_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BleConfig {
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_retry_delay_secs")]
    pub connect_retry_delay_secs: u64,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_window_secs: default_scan_window_secs(),
            connect_attempts: default_connect_attempts(),
            connect_retry_delay_secs: default_connect_retry_delay_secs(),
        }
    }
}

impl BleConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            scan_window: Duration::from_secs(self.scan_window_secs),
            connect_attempts: self.connect_attempts,
            connect_retry_delay: Duration::from_secs(self.connect_retry_delay_secs),
            ..ConnectionConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_base_interval_secs")]
    pub base_interval_secs: u64,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_min_trigger_distance_m")]
    pub min_trigger_distance_m: f64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            min_trigger_distance_m: default_min_trigger_distance_m(),
        }
    }
}

impl CollectionConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            base_interval: Duration::from_secs(self.base_interval_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
            min_trigger_distance_m: self.min_trigger_distance_m,
            ..SchedulerConfig::default()
        }
    }
}

fn default_scan_window_secs() -> u64 {
    5
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_retry_delay_secs() -> u64 {
    2
}

fn default_base_interval_secs() -> u64 {
    60
}

fn default_max_backoff_secs() -> u64 {
    600
}

fn default_min_trigger_distance_m() -> f64 {
    150.0
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal_config() {
        let toml = r#"
device_id = "garage-pi"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.device_id, "garage-pi");
        assert_eq!(config.ble.scan_window_secs, 5);
        assert_eq!(config.ble.connect_attempts, 3);
        assert_eq!(config.collection.base_interval_secs, 60);
        assert!(config.mqtt.is_none());
        assert!(config.device_store_path.is_none());
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
device_id = "garage-pi"
device_store_path = "/var/lib/voltlink/device"

[ble]
scan_window_secs = 10
connect_attempts = 5
connect_retry_delay_secs = 1

[collection]
base_interval_secs = 30
max_backoff_secs = 900
min_trigger_distance_m = 250.0

[mqtt]
broker_host = "homeassistant.local"
broker_port = 1884
client_id = "voltlink-garage"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.ble.scan_window_secs, 10);
        assert_eq!(config.ble.connect_attempts, 5);
        assert_eq!(config.collection.max_backoff_secs, 900);
        assert_eq!(config.collection.min_trigger_distance_m, 250.0);

        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.broker_host, "homeassistant.local");
        assert_eq!(mqtt.broker_port, 1884);
        assert_eq!(
            config.device_store_path.as_deref(),
            Some("/var/lib/voltlink/device")
        );
    }

    #[test]
    fn config_conversions() {
        let config: AgentConfig = toml::from_str(r#"device_id = "x""#).unwrap();
        let connection = config.ble.connection_config();
        assert_eq!(connection.scan_window, Duration::from_secs(5));
        assert_eq!(connection.connect_attempts, 3);

        let scheduler = config.collection.scheduler_config();
        assert_eq!(scheduler.base_interval, Duration::from_secs(60));
        assert_eq!(scheduler.max_backoff, Duration::from_secs(600));
        assert_eq!(scheduler.session_gap, Duration::from_secs(1800));
    }
}
