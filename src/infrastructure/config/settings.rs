//! Application configuration loading and validation.
//!
//! Provides the main [`Config`] struct that aggregates all application settings.
//! Configuration is loaded from a TOML file; `INDEXER_WS_URL` in the
//! environment (or a `.env` file) overrides the configured indexer endpoint.
//!
//! # Example
//!
//! ```no_run
//! use tradelink::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     Ok(())
//! }
//! ```

use std::path::Path;

use serde::Deserialize;
use url::Url;

use super::logging::LoggingConfig;
use super::reconnection::ReconnectionConfig;
use crate::error::{ConfigError, Result};
use crate::runtime::connection::ConnectionConfig;

/// Environment variable overriding [`IndexerConfig::ws_url`].
pub const WS_URL_ENV: &str = "INDEXER_WS_URL";

/// Indexer endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// WebSocket URL of the indexer streaming endpoint.
    #[serde(default)]
    pub ws_url: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://indexer.dydx.trade/v4/ws".into(),
        }
    }
}

/// Main application configuration.
///
/// Load from a TOML file using [`Config::load`] or parse directly with
/// [`Config::parse_toml`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Indexer streaming endpoint.
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Reconnection backoff for the indexer connection.
    #[serde(default)]
    pub reconnection: ReconnectionConfig,

    /// Logging and tracing configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML content and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;

        if let Ok(ws_url) = std::env::var(WS_URL_ENV) {
            if !ws_url.trim().is_empty() {
                config.indexer.ws_url = ws_url.trim().to_string();
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The TOML content is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.indexer.ws_url.is_empty() {
            return Err(ConfigError::MissingField { field: "ws_url" }.into());
        }
        let url = Url::parse(&self.indexer.ws_url).map_err(|e| ConfigError::InvalidValue {
            field: "ws_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                field: "ws_url",
                reason: format!("unsupported scheme '{}', expected ws or wss", url.scheme()),
            }
            .into());
        }

        self.reconnection.validate()?;

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::InvalidValue {
                field: "format",
                reason: format!("'{}' is not one of: pretty, json", self.logging.format),
            }
            .into());
        }

        Ok(())
    }

    /// Connection settings for the indexer feed.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.indexer.ws_url.clone()).with_reconnection(self.reconnection.clone())
    }

    /// Initialize logging based on configuration.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}
