//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use crate::infrastructure::config::reconnection::ReconnectionConfig;
use crate::runtime::connection::ConnectionConfig;

/// Endpoint used by scripted connections; never dialed.
pub const TEST_ENDPOINT: &str = "ws://indexer.test/v4/ws";

/// Reconnection config with the given schedule.
pub fn reconnection(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> ReconnectionConfig {
    ReconnectionConfig {
        initial_delay_ms,
        max_delay_ms,
        backoff_multiplier: multiplier,
    }
}

/// 1s doubling up to 5s.
pub fn doubling_to_5s() -> ReconnectionConfig {
    reconnection(1000, 5000, 2.0)
}

/// Connection config against [`TEST_ENDPOINT`].
pub fn connection(reconnection: ReconnectionConfig) -> ConnectionConfig {
    ConnectionConfig::new(TEST_ENDPOINT).with_reconnection(reconnection)
}
