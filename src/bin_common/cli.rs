//! CLI utilities for binaries
//!
//! Handles configuration path resolution and command line arguments.

use std::path::PathBuf;

/// Type of configuration to load
#[derive(Debug, Clone)]
pub enum ConfigType {
    /// Relay watcher configuration (relays.yaml)
    Relays,
    /// Explicit path, e.g. from the command line
    Custom(String),
}

impl ConfigType {
    /// Get the default path for this config type
    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Relays => "config/relays.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Get the environment variable that overrides the default path
    ///
    /// Explicit paths are never overridden.
    pub fn env_var_name(&self) -> Option<&str> {
        match self {
            ConfigType::Relays => Some("RELAY_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Load configuration path from environment or use default
///
/// # Arguments
/// * `config_type` - Type of configuration to load
///
/// # Returns
/// Path to the configuration file
///
/// # Examples
/// ```
/// use relay_watch::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("watch.yaml".to_string()));
/// assert_eq!(path.to_str(), Some("watch.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|name| std::env::var(name).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Parse command line arguments for a binary
///
/// Returns a vector of arguments (excluding the program name)
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

/// Config type for the given arguments: the first argument is an explicit path
pub fn config_type_from_args(args: &[String]) -> ConfigType {
    match args.first() {
        Some(path) => ConfigType::Custom(path.clone()),
        None => ConfigType::Relays,
    }
}
