use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Identifier this extension announces to Beacon peers (`sender.id`).
    pub sender_id: String,
    pub popup: PopupConfig,
    pub timeouts: TimeoutConfig,
    pub networks: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupConfig {
    pub page: String,
    pub width: u32,
    pub height: u32,
    /// Minimum distance from the screen edge, in pixels.
    pub min_offset: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub connect: u64,    // milliseconds
    pub operations: u64, // milliseconds
    pub sign: u64,       // milliseconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Named networks a DApp may ask for, mapped to their RPC endpoint.
    pub known: BTreeMap<String, String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sender_id: "temple-wallet".to_string(),
            popup: PopupConfig::default(),
            timeouts: TimeoutConfig::default(),
            networks: NetworkConfig::default(),
        }
    }
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            page: "confirm.html".to_string(),
            width: 380,
            height: 600,
            min_offset: 20,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: 60_000,
            operations: 120_000,
            sign: 120_000,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let mut known = BTreeMap::new();
        known.insert(
            "mainnet".to_string(),
            "https://mainnet.api.tez.ie".to_string(),
        );
        known.insert(
            "ghostnet".to_string(),
            "https://ghostnet.ecadinfra.com".to_string(),
        );
        Self { known }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect)
    }

    pub fn operations(&self) -> Duration {
        Duration::from_millis(self.operations)
    }

    pub fn sign(&self) -> Duration {
        Duration::from_millis(self.sign)
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sender_id.trim().is_empty() {
            return Err("Sender id must not be empty".to_string());
        }

        if self.popup.width == 0 || self.popup.height == 0 {
            return Err("Popup dimensions must be greater than 0".to_string());
        }

        if self.popup.min_offset < 0 {
            return Err("Popup minimum offset must not be negative".to_string());
        }

        if self.timeouts.connect == 0 || self.timeouts.operations == 0 || self.timeouts.sign == 0 {
            return Err("Confirmation timeouts must be greater than 0".to_string());
        }

        if self.networks.known.is_empty() {
            return Err("At least one known network must be configured".to_string());
        }

        for (name, rpc) in &self.networks.known {
            if url::Url::parse(rpc).is_err() {
                return Err(format!("Network {name} has an invalid RPC url: {rpc}"));
            }
        }

        Ok(())
    }

    pub fn with_sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = sender_id.into();
        self
    }

    pub fn with_timeouts(
        mut self,
        connect: Duration,
        operations: Duration,
        sign: Duration,
    ) -> Self {
        self.timeouts.connect = connect.as_millis() as u64;
        self.timeouts.operations = operations.as_millis() as u64;
        self.timeouts.sign = sign.as_millis() as u64;
        self
    }

    pub fn with_network(mut self, name: impl Into<String>, rpc: impl Into<String>) -> Self {
        self.networks.known.insert(name.into(), rpc.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.popup.width, 380);
        assert_eq!(config.popup.height, 600);
        assert_eq!(config.timeouts.connect(), Duration::from_secs(60));
    }

    #[test]
    fn test_json_roundtrip_keeps_overrides() {
        let config = BridgeConfig::default()
            .with_sender_id("abc123")
            .with_network("localnet", "http://localhost:8732");
        let json = config.to_json().unwrap();
        let parsed = BridgeConfig::from_json(&json).unwrap();
        assert_eq!(parsed.sender_id, "abc123");
        assert_eq!(
            parsed.networks.known.get("localnet").map(String::as_str),
            Some("http://localhost:8732")
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = BridgeConfig::default().with_timeouts(
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(config.validate().is_err());

        let config = BridgeConfig::default().with_network("broken", "not a url");
        assert!(config.validate().is_err());

        let config = BridgeConfig::default().with_sender_id("  ");
        assert!(config.validate().is_err());
    }
}
