//! Relay Watch Binary - Live Relay Monitor
//!
//! Connects to the configured relays, registers the configured subscriptions
//! and prints every received event. The health snapshot is logged
//! periodically; Ctrl+C disconnects cleanly.
//!
//! Usage:
//!   ./relay_watch                        # config/relays.yaml or RELAY_CONFIG_PATH
//!   ./relay_watch path/to/relays.yaml    # Explicit config path
//!   RELAY_URLS=wss://a,wss://b ./relay_watch

use anyhow::{Context, Result};
use relay_watch::bin_common::{
    config_type_from_args, load_config_from_env, parse_args, shutdown_signal, BinaryRunner, RunConfig,
};
use relay_watch::config::WatchConfig;
use relay_watch::logging::init_tracing;
use relay_watch::report::{event_line, health_line};
use relaypool::{RelayError, RelayPool, Subscription};
use tracing::{info, warn};

struct RelayWatch {
    run_config: RunConfig,
    config: WatchConfig,
    pool: RelayPool,
    /// Subscriptions not yet accepted because no relay was live
    pending: Vec<Subscription>,
    received: u64,
}

impl RelayWatch {
    fn new(config: WatchConfig) -> Self {
        let run_config = RunConfig::new("Relay Watch").with_health_interval(config.health_interval_secs);
        let pool = RelayPool::with_config(config.pool_config());
        let pending = config.subscriptions();

        Self {
            run_config,
            config,
            pool,
            pending,
            received: 0,
        }
    }

    /// Try to register every pending subscription
    ///
    /// Subscriptions only fail for lack of a live relay here; those stay
    /// pending for the next health tick.
    async fn register_pending(&mut self) {
        let mut still_pending = Vec::new();

        for subscription in std::mem::take(&mut self.pending) {
            let id = subscription.id.clone();
            match self.pool.subscribe(subscription.clone(), None).await {
                Ok(()) => info!("Subscription {} registered", id),
                Err(RelayError::NotConnected) => still_pending.push(subscription),
                // Recorded by the pool and replayed on reconnect
                Err(e @ RelayError::WriteFailed { .. }) => {
                    warn!("Subscription {} registered but not yet delivered: {}", id, e)
                }
                Err(e) => warn!("Subscription {} rejected: {}", id, e),
            }
        }

        if !still_pending.is_empty() {
            info!("{} subscriptions waiting for a live relay", still_pending.len());
        }
        self.pending = still_pending;
    }

    async fn log_health(&self) {
        info!("Relay health:");
        for record in self.pool.health().await {
            info!("  {}", health_line(&record));
        }
    }
}

impl BinaryRunner for RelayWatch {
    async fn run(&mut self) -> Result<()> {
        let mut events = self.pool.listen();

        if let Err(e) = self.pool.connect(self.config.desired_relays()).await {
            warn!("Some relays were not connected: {}", e);
        }
        info!(
            "Connected to {}/{} relays",
            self.pool.connected_relays().await.len(),
            self.config.desired_relays().len()
        );

        self.register_pending().await;

        let mut health_tick = tokio::time::interval(self.run_config.health_interval());
        // The first tick completes immediately
        health_tick.tick().await;

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                received = events.recv() => match received {
                    Some(received) => {
                        self.received += 1;
                        println!("{}", event_line(&received));
                    }
                    None => {
                        info!("Event stream ended");
                        break;
                    }
                },

                _ = health_tick.tick() => {
                    self.log_health().await;
                    if !self.pending.is_empty() {
                        self.register_pending().await;
                    }
                }
            }
        }

        self.pool.disconnect().await;
        self.log_health().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn summary(&self) -> Option<String> {
        Some(format!("Events received: {}", self.received))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();
    let config_path = load_config_from_env(config_type_from_args(&args));
    let config = WatchConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let mut app = RelayWatch::new(config);
    app.execute().await
}
