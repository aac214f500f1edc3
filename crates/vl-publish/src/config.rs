use serde::Deserialize;

/// MQTT broker configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname (e.g., the home-automation host).
    pub broker_host: String,
    /// Broker port.
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID (should be unique per device).
    pub client_id: String,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_minimal() {
        let toml = r#"
broker_host = "homeassistant.local"
client_id = "voltlink-garage"
"#;
        let config: MqttConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.broker_host, "homeassistant.local");
        assert_eq!(config.broker_port, 1883);
        assert_eq!(config.keepalive_secs, 30);
    }
}
