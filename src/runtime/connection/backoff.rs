//! Capped exponential backoff schedule.

use std::time::Duration;

use crate::infrastructure::config::reconnection::ReconnectionConfig;

/// Delay schedule for reconnection attempts.
///
/// The first wait after a fresh start is `initial_delay`; every failure grows
/// the next wait by the multiplier until `max_delay`, where it stays.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectionConfig,
    current_delay_ms: u64,
    failures: u32,
}

impl Backoff {
    pub fn new(config: ReconnectionConfig) -> Self {
        let initial = config.initial_delay_ms;
        Self {
            config,
            current_delay_ms: initial,
            failures: 0,
        }
    }

    /// Return the delay to wait now and advance the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.current_delay_ms);

        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);
        self.failures = self.failures.saturating_add(1);

        delay
    }

    /// Forget past failures after a successful connection.
    pub fn reset(&mut self) {
        self.current_delay_ms = self.config.initial_delay_ms;
        self.failures = 0;
    }

    /// Consecutive failures since the last reset.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }
}
