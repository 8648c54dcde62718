//! Reconnection policy: bounded attempts with exponential backoff.
//!
//! With the defaults a lost connection is retried after 1, 2, 4, 8 and 16
//! seconds. A sixth attempt is never scheduled; the client stays
//! disconnected until the caller connects again. Any success resets both
//! the attempt count and the delay.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait before the first automatic attempt after a loss.
    pub initial_delay: Duration,
    /// Ceiling for the wait between attempts.
    pub max_delay: Duration,
    /// Growth factor applied after every scheduled attempt.
    pub multiplier: f64,
    /// Attempts scheduled without an intervening success before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Wait that follows `current`, never above `max_delay`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }

    /// Whether `attempts` scheduled retries use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
