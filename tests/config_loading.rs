//! Integration test: Configuration utilities
//!
//! Tests configuration path resolution and YAML loading.

use relay_watch::bin_common::{load_config_from_env, ConfigType};
use relay_watch::config::{ConfigError, WatchConfig};
use relaypool::RelayUrl;
use std::env;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_relays_config_path_from_env_or_default() {
    env::remove_var("RELAY_CONFIG_PATH");
    let config_path = load_config_from_env(ConfigType::Relays);
    assert_eq!(config_path.to_str().unwrap(), "config/relays.yaml");

    env::set_var("RELAY_CONFIG_PATH", "/etc/relay-watch/relays.yaml");
    let config_path = load_config_from_env(ConfigType::Relays);
    assert_eq!(config_path.to_str().unwrap(), "/etc/relay-watch/relays.yaml");
    env::remove_var("RELAY_CONFIG_PATH");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_shipped_config_is_valid() {
    let config = WatchConfig::load("config/relays.yaml").unwrap();

    assert!(config.desired_relays().len() >= 1);
    assert!(!config.subscriptions().is_empty());
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
log_level: debug
relays:
  - url: wss://one.example/
  - url: WSS://Two.example
  - url: wss://three.example
    enabled: false
retry:
  base_delay_ms: 250
  max_delay_secs: 30
connect_timeout_secs: 3
write_timeout_secs: 4
health_interval_secs: 15
subscriptions:
  - id: mentions
    filters:
      - kinds: [1, 7]
        since: 1700000000
"#,
    );

    let config = WatchConfig::load(file.path()).unwrap();

    if env::var("RELAY_URLS").is_err() {
        let desired = config.desired_relays();
        assert_eq!(desired.len(), 2);
        assert!(desired.contains(&RelayUrl::new("wss://one.example")));
        assert!(desired.contains(&RelayUrl::new("wss://two.example")));
    }

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.health_interval_secs, 15);

    let pool = config.pool_config();
    assert_eq!(pool.retry_delay(1), Duration::from_millis(250));
    assert_eq!(pool.retry_delay(3), Duration::from_millis(1000));
    assert_eq!(pool.retry_delay(20), Duration::from_secs(30));
    assert_eq!(pool.get_connect_timeout(), Duration::from_secs(3));
    assert_eq!(pool.get_write_timeout(), Duration::from_secs(4));

    let subscriptions = config.subscriptions();
    assert_eq!(subscriptions[0].id, "mentions");
    assert_eq!(subscriptions[0].filters[0].since, Some(1_700_000_000));
}

#[test]
fn test_missing_file_is_file_error() {
    let result = WatchConfig::load("does/not/exist.yaml");
    assert!(matches!(result, Err(ConfigError::FileError(_))));
}

#[test]
fn test_malformed_yaml_is_yaml_error() {
    let file = write_config("relays: [unclosed");
    let result = WatchConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::YamlError(_))));
}

#[test]
fn test_invalid_values_are_validation_errors() {
    let file = write_config("log_level: chatty\nrelays:\n  - url: wss://one.example\n");
    let result = WatchConfig::load(file.path());
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}
