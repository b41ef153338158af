//! # Configuration Utilities
//!
//! Client configuration is read from a TOML file. Only `service.api_key` is
//! required; everything else falls back to the public service defaults.
//!
//! ```toml
//! [service]
//! base_url = "http://nova.astrometry.net/api"
//! api_key = "abcdefghijklmnop"
//! timeout_secs = 60
//!
//! [polling]
//! interval_secs = 30
//! max_rounds = 40
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Public endpoint of the plate-solving API.
pub const DEFAULT_BASE_URL: &str = "http://nova.astrometry.net/api";

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: ClientConfig = load_config("config/telescope.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Where and how to reach the service
    #[serde(default)]
    pub service: ServiceConfig,
    /// Cadence for caller-driven polling
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Service address, credentials and network limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API root, without a trailing slash (e.g., "http://nova.astrometry.net/api")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Long-lived API key exchanged for a session token on login
    #[serde(default)]
    pub api_key: String,
    /// Upper bound for a single HTTP exchange (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Polling cadence used by the command-line front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between two refresh rounds (seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Give up after this many refresh rounds
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_rounds() -> u32 {
    40
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_rounds: default_max_rounds(),
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ClientConfig {
    /// Loads client configuration from a TOML file.
    ///
    /// Validation is left to [`ClientConfig::validate`] so command-line
    /// overrides can be applied first.
    pub fn from_file(path: &str) -> Result<Self> {
        let config: ClientConfig = load_config(path)?;
        Ok(config)
    }

    /// Builds a configuration pointing at the public service with default limits.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.service.api_key = api_key.into();
        config
    }

    /// Checks the settings a client cannot work without.
    pub fn validate(&self) -> Result<()> {
        if self.service.api_key.trim().is_empty() {
            anyhow::bail!("service.api_key must be set");
        }
        if self.service.timeout_secs == 0 {
            anyhow::bail!("service.timeout_secs must be greater than zero");
        }
        if self.service.base_url.trim().is_empty() {
            anyhow::bail!("service.base_url must not be empty");
        }
        Ok(())
    }
}
