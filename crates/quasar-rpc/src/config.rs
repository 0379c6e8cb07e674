//! Runtime configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configured address is not a valid socket address.
    #[error("invalid address: {0}")]
    Addr(#[from] std::net::AddrParseError),
}

/// Endpoint configuration, loadable from TOML.
///
/// Every field has a default, so an empty file (or no file) is a valid
/// configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
    /// Address to bind or connect to.
    pub address: String,
    /// Service identifier this endpoint hosts or targets.
    pub service_id: u16,
    /// Default call deadline in milliseconds; absent means wait
    /// indefinitely.
    pub default_timeout_ms: Option<u64>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:32640".to_owned(),
            service_id: 1,
            default_timeout_ms: Some(30_000),
        }
    }
}

impl RpcConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// The configured address, parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(self.address.parse()?)
    }

    /// The default call deadline as a [`Duration`].
    #[must_use]
    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = RpcConfig::default();
        assert_eq!(config.service_id, 1);
        assert!(config.socket_addr().is_ok());
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(30_000)));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: RpcConfig = toml::from_str(
            r#"
            address = "0.0.0.0:9000"
            default_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.address, "0.0.0.0:9000");
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(config.service_id, 1);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<RpcConfig, _> = toml::from_str("defualt_timeout_ms = 1024");
        assert!(result.is_err());
    }

    #[test]
    fn bad_address_is_a_config_error() {
        let config: RpcConfig = toml::from_str(r#"address = "not-an-address""#).unwrap();
        assert!(matches!(config.socket_addr(), Err(ConfigError::Addr(_))));
    }
}
