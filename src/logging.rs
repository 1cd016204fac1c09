//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, otherwise `level`
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize tracing with standard configuration
///
/// Later calls are ignored once a global subscriber is installed.
pub fn init_tracing(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .try_init();
}
