use crate::ip::AddressRange;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Default range container subnets are carved from: 10.254.0.0/22
pub fn default_pool() -> Ipv4Net {
    Ipv4Net::new(Ipv4Addr::new(10, 254, 0, 0), 22).expect("/22 is a valid IPv4 prefix length")
}

/// Default per-container subnet prefix: network, gateway, container, broadcast
pub const DEFAULT_SUBNET_PREFIX: u8 = 30;

/// Default container interface MTU
pub const DEFAULT_MTU: u32 = 1500;

/// Top-level configuration structure that mirrors the YAML configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(level) = &self.general.log_level {
            if level.parse::<log::LevelFilter>().is_err() {
                return Err(ValidationError::InvalidGeneral(format!(
                    "unknown log_level '{}'",
                    level
                )));
            }
        }

        self.network.validate()
    }
}

/// General process settings
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Container network settings, fixed for the lifetime of the process
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address range every container subnet is drawn from (e.g., "10.254.0.0/22")
    pub pool: Ipv4Net,
    /// Prefix length of dynamically allocated subnets
    pub subnet_prefix: u8,
    /// MTU of the container's network interface
    pub mtu: u32,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        AddressRange::new(self.pool, self.subnet_prefix)
            .map_err(|e| ValidationError::InvalidNetwork(e.to_string()))?;

        // 68 is the smallest MTU an IPv4 host must accept
        if !(68..=65535).contains(&self.mtu) {
            return Err(ValidationError::InvalidNetwork(format!(
                "mtu {} must be between 68 and 65535",
                self.mtu
            )));
        }

        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pool: default_pool(),
            subnet_prefix: DEFAULT_SUBNET_PREFIX,
            mtu: DEFAULT_MTU,
        }
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
}
