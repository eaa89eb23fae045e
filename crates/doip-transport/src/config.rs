//! DoIP entity configuration
//!
//! Every field has a default, so an empty TOML document is a valid config.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::uds::Address;

/// Complete DoIP entity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoIpConfig {
    /// TCP listener and channel pool
    #[serde(default)]
    pub tcp: TcpChannelConfig,

    /// Largest payload length accepted in a generic header
    #[serde(default = "default_max_message_length")]
    pub max_message_length: u32,

    /// 0x00 gateway, 0x01 node
    #[serde(default = "default_node_type")]
    pub node_type: u8,

    /// Logical address reported in routing activation responses
    #[serde(default = "default_primary_target_address")]
    pub primary_target_address: Address,

    /// Physical target addresses reachable through this entity.
    /// Empty means every target address is accepted.
    #[serde(default)]
    pub target_addresses: Vec<Address>,

    /// Inactivity timeouts
    #[serde(default)]
    pub timing: TimingConfig,

    /// Routing activation acceptance rules
    #[serde(default)]
    pub routing_activation: RoutingActivationConfig,
}

fn default_max_message_length() -> u32 {
    4096
}

fn default_node_type() -> u8 {
    0x01
}

fn default_primary_target_address() -> Address {
    0x0010
}

impl Default for DoIpConfig {
    fn default() -> Self {
        Self {
            tcp: TcpChannelConfig::default(),
            max_message_length: default_max_message_length(),
            node_type: default_node_type(),
            primary_target_address: default_primary_target_address(),
            target_addresses: Vec::new(),
            timing: TimingConfig::default(),
            routing_activation: RoutingActivationConfig::default(),
        }
    }
}

impl DoIpConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the channel engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tcp.max_channels == 0 {
            return Err(ConfigError::Invalid(
                "tcp.max_channels must be at least 1".to_string(),
            ));
        }
        if self.routing_activation.min_source_address > self.routing_activation.max_source_address
        {
            return Err(ConfigError::Invalid(format!(
                "routing_activation.min_source_address 0x{:04X} exceeds max_source_address 0x{:04X}",
                self.routing_activation.min_source_address,
                self.routing_activation.max_source_address
            )));
        }
        // a diagnostic message needs SA, TA and at least one UDS byte
        if self.max_message_length < 5 {
            return Err(ConfigError::Invalid(
                "max_message_length must be at least 5".to_string(),
            ));
        }
        if self.timing.initial_inactivity_ms == 0 || self.timing.general_inactivity_ms == 0 {
            return Err(ConfigError::Invalid(
                "inactivity timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a physical target address is served by this entity
    pub fn is_known_target_address(&self, target_address: Address) -> bool {
        self.target_addresses.is_empty() || self.target_addresses.contains(&target_address)
    }
}

// =============================================================================
// TCP Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpChannelConfig {
    /// Listen address
    #[serde(default = "default_ip_address")]
    pub ip_address: IpAddr,

    /// Listen port (13400 is the DoIP data port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Concurrent routing-activated connections
    #[serde(default = "default_max_channels")]
    pub max_channels: usize,
}

fn default_ip_address() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    13400
}

fn default_max_channels() -> usize {
    4
}

impl Default for TcpChannelConfig {
    fn default() -> Self {
        Self {
            ip_address: default_ip_address(),
            port: default_port(),
            max_channels: default_max_channels(),
        }
    }
}

// =============================================================================
// Timing Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Time allowed between accept and routing activation
    #[serde(default = "default_initial_inactivity_ms")]
    pub initial_inactivity_ms: u64,

    /// Time allowed between messages on a registered channel
    #[serde(default = "default_general_inactivity_ms")]
    pub general_inactivity_ms: u64,
}

fn default_initial_inactivity_ms() -> u64 {
    2000
}

fn default_general_inactivity_ms() -> u64 {
    5000
}

impl TimingConfig {
    pub fn initial_inactivity(&self) -> Duration {
        Duration::from_millis(self.initial_inactivity_ms)
    }

    pub fn general_inactivity(&self) -> Duration {
        Duration::from_millis(self.general_inactivity_ms)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            initial_inactivity_ms: default_initial_inactivity_ms(),
            general_inactivity_ms: default_general_inactivity_ms(),
        }
    }
}

// =============================================================================
// Routing Activation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingActivationConfig {
    /// Lowest tester source address accepted
    #[serde(default = "default_min_source_address")]
    pub min_source_address: Address,

    /// Highest tester source address accepted
    #[serde(default = "default_max_source_address")]
    pub max_source_address: Address,

    /// The single supported activation type
    #[serde(default = "default_activation_type")]
    pub activation_type: u8,
}

fn default_min_source_address() -> Address {
    0x0000
}

fn default_max_source_address() -> Address {
    0xFFFF
}

fn default_activation_type() -> u8 {
    0x00
}

impl RoutingActivationConfig {
    pub fn is_known_source_address(&self, source_address: Address) -> bool {
        (self.min_source_address..=self.max_source_address).contains(&source_address)
    }
}

impl Default for RoutingActivationConfig {
    fn default() -> Self {
        Self {
            min_source_address: default_min_source_address(),
            max_source_address: default_max_source_address(),
            activation_type: default_activation_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DoIpConfig::from_toml_str("").unwrap();
        assert_eq!(config.tcp.port, 13400);
        assert_eq!(config.tcp.max_channels, 4);
        assert_eq!(config.max_message_length, 4096);
        assert_eq!(config.primary_target_address, 0x0010);
        assert_eq!(config.timing.initial_inactivity(), Duration::from_millis(2000));
        assert_eq!(config.timing.general_inactivity(), Duration::from_millis(5000));
        assert!(config.routing_activation.is_known_source_address(0xFFFF));
    }

    #[test]
    fn test_partial_document_overrides() {
        let config = DoIpConfig::from_toml_str(
            r#"
            primary_target_address = 0x1234
            target_addresses = [0x1234, 0x1235]

            [tcp]
            port = 13401
            max_channels = 2

            [routing_activation]
            min_source_address = 0x0E00
            max_source_address = 0x0EFF
            "#,
        )
        .unwrap();
        assert_eq!(config.tcp.port, 13401);
        assert_eq!(config.tcp.max_channels, 2);
        assert_eq!(config.primary_target_address, 0x1234);
        assert!(config.is_known_target_address(0x1235));
        assert!(!config.is_known_target_address(0x0010));
        assert!(config.routing_activation.is_known_source_address(0x0E80));
        assert!(!config.routing_activation.is_known_source_address(0x0F00));
    }

    #[test]
    fn test_empty_target_list_accepts_everything() {
        let config = DoIpConfig::default();
        assert!(config.is_known_target_address(0x4711));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DoIpConfig::default();
        config.tcp.max_channels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = DoIpConfig::default();
        config.routing_activation.min_source_address = 0x0F00;
        config.routing_activation.max_source_address = 0x0E00;
        assert!(config.validate().is_err());

        let mut config = DoIpConfig::default();
        config.max_message_length = 4;
        assert!(config.validate().is_err());

        let mut config = DoIpConfig::default();
        config.timing.general_inactivity_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "node_type = 0\n[timing]\ninitial_inactivity_ms = 500").unwrap();
        let config = DoIpConfig::load(file.path()).unwrap();
        assert_eq!(config.node_type, 0);
        assert_eq!(config.timing.initial_inactivity_ms, 500);
        assert_eq!(config.timing.general_inactivity_ms, 5000);
    }

    #[test]
    fn test_load_missing_file() {
        let err = DoIpConfig::load("/nonexistent/doipd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
