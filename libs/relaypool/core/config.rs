use crate::traits::{ExponentialBackoff, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs for a [`RelayPool`](crate::RelayPool)
///
/// # Example
/// ```ignore
/// let config = PoolConfig::default()
///     .retry_policy(ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30)))
///     .connect_timeout(Duration::from_secs(5));
/// ```
#[derive(Clone)]
pub struct PoolConfig {
    /// Delay policy for reconnection attempts
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,

    /// An open attempt that takes longer than this counts as failed
    pub(crate) connect_timeout: Duration,

    /// A send that takes longer than this counts as a write failure
    pub(crate) write_timeout: Duration,
}

impl PoolConfig {
    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Delay before the given reconnection attempt
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.retry_policy.delay_for(attempt)
    }

    pub fn get_connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn get_write_timeout(&self) -> Duration {
        self.write_timeout
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retry_policy: Arc::new(ExponentialBackoff::default()),
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("first_retry_delay", &self.retry_policy.delay_for(1))
            .field("connect_timeout", &self.connect_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FixedDelay;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(1));
        assert_eq!(config.retry_delay(7), Duration::from_secs(60));
        assert_eq!(config.get_connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.get_write_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_builder_overrides() {
        let config = PoolConfig::default()
            .retry_policy(FixedDelay::new(Duration::from_millis(20)))
            .connect_timeout(Duration::from_millis(200))
            .write_timeout(Duration::from_millis(300));

        assert_eq!(config.retry_delay(9), Duration::from_millis(20));
        assert_eq!(config.get_connect_timeout(), Duration::from_millis(200));
        assert_eq!(config.get_write_timeout(), Duration::from_millis(300));
    }
}
