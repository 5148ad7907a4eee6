//! Bridge configuration.
//!
//! All settings come from the environment with defaults from
//! [`constants`](crate::constants). Values are parsed and validated once at
//! startup; nothing re-reads the environment afterwards.
//!
//! # Example
//!
//! ```
//! use cardbridge_core::BridgeConfig;
//!
//! let config = BridgeConfig::from_lookup(|key| match key {
//!     "SERIAL_PORT" => Some("/dev/ttyUSB0".to_string()),
//!     "BAUD_RATE" => Some("115200".to_string()),
//!     _ => None,
//! })
//! .unwrap();
//!
//! assert_eq!(config.serial_port, "/dev/ttyUSB0");
//! assert_eq!(config.baud_rate, 115200);
//! assert_eq!(config.ws_port, 8765);
//! ```

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::{Error, Result};

/// Runtime configuration of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Serial device path (`COM4`, `/dev/ttyUSB0`).
    pub serial_port: String,

    /// Serial baud rate.
    pub baud_rate: u32,

    /// Read timeout of the serial port.
    pub serial_timeout: Duration,

    /// Backend base URL, without trailing slash.
    pub api_base_url: String,

    /// Optional bearer token for backend requests.
    pub api_token: Option<String>,

    /// Timeout applied to every backend request.
    pub backend_timeout: Duration,

    /// Bind address of the real-time server.
    pub ws_bind: IpAddr,

    /// Port of the real-time server.
    pub ws_port: u16,

    /// Optional upstream WebSocket peer that receives every notification.
    pub peer_url: Option<String>,

    /// Lifetime of a verified session.
    pub session_ttl: Duration,

    /// Optional SQLite file for the raw reading log.
    pub readings_db: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            serial_timeout: Duration::from_millis(DEFAULT_SERIAL_TIMEOUT_MS),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            backend_timeout: Duration::from_millis(DEFAULT_BACKEND_TIMEOUT_MS),
            ws_bind: DEFAULT_WS_BIND,
            ws_port: DEFAULT_WS_PORT,
            peer_url: None,
            session_ttl: Duration::from_secs(SESSION_TTL_SECS),
            readings_db: None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from process environment variables.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfig` if a variable is present but cannot be
    /// parsed, or `Error::Config` if the resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    /// Same as [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            serial_port: get("SERIAL_PORT").unwrap_or(defaults.serial_port),
            baud_rate: parse_or("BAUD_RATE", get("BAUD_RATE"), defaults.baud_rate)?,
            serial_timeout: parse_or(
                "SERIAL_TIMEOUT_MS",
                get("SERIAL_TIMEOUT_MS"),
                DEFAULT_SERIAL_TIMEOUT_MS,
            )
            .map(Duration::from_millis)?,
            api_base_url: get("API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            api_token: get("API_TOKEN"),
            backend_timeout: parse_or(
                "BACKEND_TIMEOUT_MS",
                get("BACKEND_TIMEOUT_MS"),
                DEFAULT_BACKEND_TIMEOUT_MS,
            )
            .map(Duration::from_millis)?,
            ws_bind: parse_or("WS_BIND", get("WS_BIND"), defaults.ws_bind)?,
            ws_port: parse_or("WS_PORT", get("WS_PORT"), defaults.ws_port)?,
            peer_url: get("PEER_URL"),
            session_ttl: parse_or("SESSION_TTL_SECS", get("SESSION_TTL_SECS"), SESSION_TTL_SECS)
                .map(Duration::from_secs)?,
            readings_db: get("READINGS_DB"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field rules that parsing alone cannot enforce.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            return Err(Error::Config("serial port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(Error::Config("baud rate must be greater than 0".to_string()));
        }
        if self.ws_port == 0 {
            return Err(Error::Config("WS_PORT must be greater than 0".to_string()));
        }
        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API_BASE_URL must be an http(s) URL, got {}",
                self.api_base_url
            )));
        }
        if let Some(peer) = &self.peer_url
            && !(peer.starts_with("ws://") || peer.starts_with("wss://"))
        {
            return Err(Error::Config(format!(
                "PEER_URL must be a ws(s) URL, got {peer}"
            )));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::Config("session TTL must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Socket address the real-time server binds to.
    #[must_use]
    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ws_bind, self.ws_port)
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.serial_port, "COM4");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.api_base_url, "http://localhost:3001/api");
        assert_eq!(config.api_token, None);
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.ws_addr().to_string(), "127.0.0.1:8765");
    }

    #[test]
    fn test_overrides() {
        let config = BridgeConfig::from_lookup(lookup(&[
            ("SERIAL_PORT", "/dev/ttyACM0"),
            ("BAUD_RATE", "115200"),
            ("API_BASE_URL", "https://pos.example.com/api/"),
            ("API_TOKEN", "secret"),
            ("WS_BIND", "0.0.0.0"),
            ("WS_PORT", "9000"),
            ("PEER_URL", "ws://10.0.0.2:3001/bridge"),
            ("SESSION_TTL_SECS", "60"),
            ("READINGS_DB", "data/readings.db"),
        ]))
        .unwrap();

        assert_eq!(config.serial_port, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.api_base_url, "https://pos.example.com/api");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.ws_addr().to_string(), "0.0.0.0:9000");
        assert_eq!(config.peer_url.as_deref(), Some("ws://10.0.0.2:3001/bridge"));
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.readings_db.as_deref(), Some("data/readings.db"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = BridgeConfig::from_lookup(lookup(&[("API_TOKEN", ""), ("BAUD_RATE", " ")]))
            .unwrap();
        assert_eq!(config.api_token, None);
        assert_eq!(config.baud_rate, 9600);
    }

    #[test]
    fn test_unparseable_value() {
        let err = BridgeConfig::from_lookup(lookup(&[("BAUD_RATE", "fast")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { ref key, .. } if key == "BAUD_RATE"));
    }

    #[test]
    fn test_validation_rules() {
        assert!(BridgeConfig::from_lookup(lookup(&[("BAUD_RATE", "0")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[("WS_PORT", "0")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[("API_BASE_URL", "localhost:3001")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[("PEER_URL", "http://peer")])).is_err());
        assert!(BridgeConfig::from_lookup(lookup(&[("SESSION_TTL_SECS", "0")])).is_err());
    }
}
