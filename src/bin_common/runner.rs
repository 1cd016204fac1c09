//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with proper
//! logging, periodic health reporting, and graceful shutdown.

use std::time::Duration;
use tokio::signal;
use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Health report interval in seconds
    pub health_interval_secs: u64,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_interval_secs: 60,
        }
    }

    /// Set health report interval
    pub fn with_health_interval(mut self, secs: u64) -> Self {
        self.health_interval_secs = secs;
        self
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs.max(1))
    }
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application main loop
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Summary printed in the shutdown banner
    fn summary(&self) -> Option<String> {
        None
    }

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        let summary = self.summary();
        self.print_shutdown(summary.as_deref());
        result
    }
}

/// Resolve once Ctrl+C is received
pub async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("");
        info!("Received shutdown signal (Ctrl+C)");
        info!("Shutting down gracefully...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("test-binary").with_health_interval(15);

        assert_eq!(config.name, "test-binary");
        assert_eq!(config.health_interval_secs, 15);
        assert_eq!(config.health_interval(), Duration::from_secs(15));
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default");
        assert_eq!(config.health_interval_secs, 60);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = RunConfig::new("zero").with_health_interval(0);
        assert_eq!(config.health_interval(), Duration::from_secs(1));
    }

    struct Counting {
        config: RunConfig,
        runs: usize,
    }

    impl BinaryRunner for Counting {
        async fn run(&mut self) -> anyhow::Result<()> {
            self.runs += 1;
            Ok(())
        }

        fn config(&self) -> &RunConfig {
            &self.config
        }

        fn summary(&self) -> Option<String> {
            Some(format!("runs: {}", self.runs))
        }
    }

    #[tokio::test]
    async fn test_execute_runs_once() {
        let mut runner = Counting {
            config: RunConfig::new("counting"),
            runs: 0,
        };
        runner.execute().await.unwrap();
        assert_eq!(runner.runs, 1);
        assert_eq!(runner.summary().as_deref(), Some("runs: 1"));
    }
}
