//! # Configuration Management Module
//!
//! Gateway configuration is a TOML file with three sections:
//!
//! - [`GatewayConfig`] - socket binding and the identity written into outbound documents
//! - [`QueueConfig`] - retry interval, message lifetime and scheduler tick
//! - [`LoggingConfig`] - log level and optional log file
//!
//! Every section and field has a default, so a partial (or empty) file loads.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use dectgw::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Listening on {}", config.gateway.listen_addr()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [gateway]
//! bind_address = "0.0.0.0"
//! port = 1300
//! name = "server"
//! protocol_version = "19.11.12.1403"
//!
//! [queue]
//! retry_interval_secs = 60
//! max_age_secs = 604800
//! tick_ms = 1000
//! stats_interval_secs = 300
//!
//! [logging]
//! level = "info"
//! file = "dectgw.log"
//! ```

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_address: String,
    pub port: u16,
    /// Written into `systemdata/name` of every outbound document.
    pub name: String,
    /// `version` attribute of outbound documents. Base stations reject
    /// documents whose version they do not recognise.
    pub protocol_version: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 1300,
            name: "server".to_string(),
            protocol_version: "19.11.12.1403".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| anyhow!("Invalid listen address {}:{}: {}", self.bind_address, self.port, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Minimum time between two delivery attempts of the same message.
    pub retry_interval_secs: u64,
    /// Messages older than this are dropped undelivered.
    pub max_age_secs: u64,
    /// Retry scheduler tick.
    pub tick_ms: u64,
    /// Interval for periodic stats logging (0 disables).
    pub stats_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 60,
            max_age_secs: 7 * 24 * 60 * 60,
            tick_ms: 1000,
            stats_interval_secs: 300,
        }
    }
}

impl QueueConfig {
    pub fn retry_interval(&self) -> chrono::Duration {
        window(self.retry_interval_secs)
    }
    pub fn max_age(&self) -> chrono::Duration {
        window(self.max_age_secs)
    }
    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    /// Reject queue settings the retry scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            bail!("queue.tick_ms must be non-zero");
        }
        if self.retry_interval_secs == 0 {
            bail!("queue.retry_interval_secs must be non-zero");
        }
        for (field, secs) in [
            ("queue.retry_interval_secs", self.retry_interval_secs),
            ("queue.max_age_secs", self.max_age_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                bail!("{} ({}) must not exceed {}", field, secs, MAX_WINDOW_SECS);
            }
        }
        if self.max_age_secs < self.retry_interval_secs {
            bail!(
                "queue.max_age_secs ({}) must not be shorter than queue.retry_interval_secs ({})",
                self.max_age_secs,
                self.retry_interval_secs
            );
        }
        Ok(())
    }
}

/// Upper bound for `retry_interval_secs` and `max_age_secs` (ten years).
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Seconds as a `chrono::Duration`, saturating instead of overflowing.
fn window(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown names fall back to `Info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.port == 0 {
            bail!("gateway.port must be non-zero");
        }
        self.gateway.listen_addr()?;
        self.queue.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 1300);
        assert_eq!(config.queue.retry_interval_secs, 60);
        assert_eq!(config.queue.max_age_secs, 604_800);
        assert_eq!(config.queue.tick(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: Config = toml::from_str("[gateway]\nport = 4000\n").unwrap();
        assert_eq!(config.gateway.port, 4000);
        assert_eq!(config.gateway.bind_address, "0.0.0.0");
        assert_eq!(config.queue.tick_ms, 1000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.gateway.name, "server");
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = Config::default();
        config.queue.max_age_secs = 10;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.queue.tick_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.gateway.bind_address = "not an address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_windows_are_rejected_and_never_panic() {
        let mut config = Config::default();
        config.queue.max_age_secs = 10_000_000_000_000_000;
        assert!(config.validate().is_err());
        assert_eq!(config.queue.max_age(), chrono::Duration::MAX);

        config.queue.max_age_secs = u64::MAX;
        config.queue.retry_interval_secs = u64::MAX;
        assert!(config.queue.validate().is_err());
        assert_eq!(config.queue.retry_interval(), chrono::Duration::MAX);

        let mut config = Config::default();
        config.queue.max_age_secs = MAX_WINDOW_SECS;
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.max_age().num_seconds(), MAX_WINDOW_SECS as i64);
        config.queue.max_age_secs = MAX_WINDOW_SECS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_tick_still_yields_a_usable_period() {
        let mut queue = QueueConfig::default();
        queue.tick_ms = 0;
        assert!(queue.validate().is_err());
        assert_eq!(queue.tick(), Duration::from_millis(1));
    }

    #[test]
    fn level_filter_parsing() {
        let mut logging = LoggingConfig::default();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
        logging.level = "debug".to_string();
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);
        logging.level = "chatty".to_string();
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(serialized.contains("[gateway]"));
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.gateway.protocol_version, "19.11.12.1403");
    }
}
