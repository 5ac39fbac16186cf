//! Application configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use trendora_market::MarketConfig;

/// Application configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sweep scheduler configuration.
    pub sweep: SweepSettings,
    /// Market-data provider configuration.
    pub market: MarketSettings,
    /// SQLite database URL for the alert store.
    pub database_url: String,
    /// Logging level.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sweep: SweepSettings::default(),
            market: MarketSettings::default(),
            database_url: "sqlite://trendora.db".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file, falling back to defaults when the file is
    /// missing or malformed.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path, error = %err, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// Sweep scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSettings {
    /// Seconds between matching sweeps.
    pub interval_secs: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

/// Market-data provider settings. The demo API key comes from the
/// environment, not the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSettings {
    /// Provider API base URL.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        let defaults = MarketConfig::default();
        Self {
            base_url: defaults.base_url,
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl MarketSettings {
    /// Build the client config, attaching the API key when present.
    pub fn to_market_config(&self, api_key: Option<String>) -> MarketConfig {
        MarketConfig {
            base_url: self.base_url.clone(),
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}
