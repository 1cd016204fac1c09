//! Relay watcher configuration
//!
//! Loaded from YAML, with `.env` support and a `RELAY_URLS` override for the
//! relay list. The file doubles as the relay directory: its enabled entries
//! are the desired set handed to the pool.

use relaypool::{ExponentialBackoff, Filter, PoolConfig, RelayEndpoint, RelayUrl, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Environment variable replacing the configured relay list (comma-separated)
pub const RELAY_URLS_ENV: &str = "RELAY_URLS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main relay watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Relay directory
    #[serde(default)]
    pub relays: Vec<RelayEndpoint>,

    /// Reconnection backoff
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// How often the health snapshot is logged
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Standing subscriptions registered at startup
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// Exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// One configured subscription; the id is generated when omitted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub filters: Vec<Filter>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_write_timeout() -> u64 {
    10
}

fn default_health_interval() -> u64 {
    60
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_secs() -> u64 {
    60
}

impl WatchConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: WatchConfig = serde_yaml::from_str(&yaml_content)?;

        // Don't fail if .env doesn't exist
        dotenv::dotenv().ok();

        if let Ok(urls) = std::env::var(RELAY_URLS_ENV) {
            info!("Overriding relay list from {}", RELAY_URLS_ENV);
            config.override_relays(&urls);
        }

        config.validate()?;
        Ok(config)
    }

    /// Replace the relay list with a comma-separated URL list
    pub fn override_relays(&mut self, urls: &str) {
        self.relays = urls
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| RelayEndpoint::new(url, true))
            .collect();
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.desired_relays().is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one enabled relay is required".to_string(),
            ));
        }

        if self.retry.base_delay_ms == 0 || self.retry.max_delay_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry delays must be positive".to_string(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_secs.saturating_mul(1000) {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms must not exceed retry.max_delay_secs".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 || self.write_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeouts must be positive".to_string(),
            ));
        }

        if self.health_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "health_interval_secs must be positive".to_string(),
            ));
        }

        for (index, subscription) in self.subscriptions.iter().enumerate() {
            if subscription.filters.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "subscription {} has no filters",
                    subscription.id.as_deref().unwrap_or(&index.to_string())
                )));
            }
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Relay Watch Configuration:");
        info!("  Log level: {}", self.log_level);
        info!("Relays:");
        for endpoint in &self.relays {
            info!(
                "  {} ({})",
                endpoint.url,
                if endpoint.enabled { "enabled" } else { "disabled" }
            );
        }
        info!("Retry:");
        info!("  Base delay: {} ms", self.retry.base_delay_ms);
        info!("  Max delay: {} seconds", self.retry.max_delay_secs);
        info!("Timeouts:");
        info!("  Connect: {} seconds", self.connect_timeout_secs);
        info!("  Write: {} seconds", self.write_timeout_secs);
        info!("Health interval: {} seconds", self.health_interval_secs);
        info!("Subscriptions: {}", self.subscriptions.len());
    }

    /// Pool tuning derived from this configuration
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .retry_policy(ExponentialBackoff::new(
                Duration::from_millis(self.retry.base_delay_ms),
                Duration::from_secs(self.retry.max_delay_secs),
            ))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .write_timeout(Duration::from_secs(self.write_timeout_secs))
    }

    /// Enabled relay URLs
    pub fn desired_relays(&self) -> HashSet<RelayUrl> {
        RelayEndpoint::desired_set(&self.relays)
    }

    /// Configured subscriptions, generating ids where none were given
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .map(|config| match &config.id {
                Some(id) => Subscription::with_id(id.clone(), config.filters.clone()),
                None => Subscription::new(config.filters.clone()),
            })
            .collect()
    }
}
