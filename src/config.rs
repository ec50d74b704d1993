//! Configuration file handling with TOML support.

use crate::api::COINGECKO_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub quotes: QuotesConfig,

    /// Identity of the local console subscriber
    #[serde(default)]
    pub console: ConsoleConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Seconds between price checks
    #[serde(default = "default_check_interval")]
    pub check_interval: f64,

    /// API timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Log filter used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            timeout: default_timeout(),
            log_level: default_log_level(),
        }
    }
}

fn default_check_interval() -> f64 {
    60.0
}
fn default_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StorageConfig {
    /// Subscription file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotesConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Quote currency as understood by the API
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for QuotesConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            currency: default_currency(),
        }
    }
}

fn default_base_url() -> String {
    COINGECKO_URL.to_string()
}
fn default_currency() -> String {
    "usd".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleConfig {
    #[serde(default = "default_subscriber")]
    pub subscriber: i64,

    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            subscriber: default_subscriber(),
            name: default_name(),
        }
    }
}

fn default_subscriber() -> i64 {
    1
}
fn default_name() -> String {
    std::env::var("USER").unwrap_or_else(|_| "console".to_string())
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from the default location, or defaults when there is no file.
    ///
    /// A file that exists but does not parse is an error rather than silently ignored.
    pub fn load_or_default() -> Result<Self> {
        match Self::default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pricepulse").join("config.toml"))
    }

    /// Subscription file to use: the configured one, else the platform data directory.
    pub fn store_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .or_else(default_store_path)
            .unwrap_or_else(|| PathBuf::from("subscriptions.json"))
    }

    pub fn check_interval(&self) -> Duration {
        if self.general.check_interval.is_finite() && self.general.check_interval > 0.0 {
            Duration::from_secs_f64(self.general.check_interval)
        } else {
            Duration::from_secs_f64(default_check_interval())
        }
    }
}

pub fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pricepulse").join("subscriptions.json"))
}

/// Generate a sample configuration file content.
pub fn sample_config() -> &'static str {
    r##"# PricePulse Configuration File
# Price change alerts for crypto assets

[general]
# Seconds between price checks
check_interval = 60
# API timeout in seconds
timeout = 10
# Log filter when RUST_LOG is unset (error, warn, info, debug, trace)
log_level = "info"

[storage]
# Subscription file (defaults to the platform data directory)
# path = "/var/lib/pricepulse/subscriptions.json"

[quotes]
# CoinGecko compatible API root
base_url = "https://api.coingecko.com/api/v3"
# Quote currency
currency = "usd"

[console]
# Subscriber id and name used by the console session
subscriber = 1
name = "console"
"##
}
