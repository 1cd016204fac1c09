//! Relay Watch - Main Library
//!
//! Watches a set of publish/subscribe relays: keeps connections alive,
//! registers configured subscriptions and prints received events.
//!
//! ## Architecture
//!
//! - **relaypool**: Connection manager library (re-exported from workspace)
//! - **config**: YAML configuration with `.env` and `RELAY_URLS` overrides
//! - **logging**: tracing subscriber setup
//! - **report**: console formatting for events and health records
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use relay_watch::bin_common::{load_config_from_env, ConfigType};
//! use relay_watch::relaypool::RelayPool;
//! ```

// Re-export workspace libraries for convenience
pub use relaypool;

pub mod config;
pub mod logging;
pub mod report;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{config_type_from_args, load_config_from_env, parse_args, ConfigType};
    pub use runner::{shutdown_signal, BinaryRunner, RunConfig};
}
