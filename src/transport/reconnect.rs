use std::time::Duration;

use crate::config::TransportConfig;

/// Bounded exponential backoff for the event-tagged channel.
///
/// Attempt `n` (1-based) waits `initial * 2^(n-1)`, capped at `max_delay`.
/// There is no attempt after `max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
        }
    }

    /// Delay before attempt `attempt`, or `None` once retries are exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2_u32.saturating_pow(attempt - 1);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }

    /// All delays in attempt order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).filter_map(|attempt| self.delay_for(attempt))
    }
}

impl From<&TransportConfig> for ReconnectPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self::new(
            config.reconnect_attempts,
            Duration::from_millis(config.reconnect_delay_ms),
            Duration::from_millis(config.reconnect_delay_max_ms),
        )
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}
