use std::time::Duration;

/// Trait for defining reconnection delays
///
/// Implement this trait to control how long the manager waits before
/// re-attempting a relay that failed to open or dropped.
pub trait RetryPolicy: Send + Sync {
    /// Get the delay before the given reconnection attempt
    ///
    /// # Arguments
    /// * `attempt` - The reconnection attempt number (1-indexed, uncapped)
    fn delay_for(&self, attempt: u32) -> Duration;
}

/// Exponential backoff reconnection policy
///
/// Delays grow as `initial_delay * 2^(attempt-1)`, capped at `max_delay`.
/// With the defaults the sequence is 1s, 2s, 4s, ... 32s, 60s, 60s, ...
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    ///
    /// # Arguments
    /// * `initial_delay` - Delay before the first reconnect
    /// * `max_delay` - The maximum delay between reconnects
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64 << exponent;
        let base = self.initial_delay.as_millis() as u64;
        let delay = base.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }
}

/// Fixed delay reconnection policy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl RetryPolicy for FixedDelay {
    fn delay_for(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
