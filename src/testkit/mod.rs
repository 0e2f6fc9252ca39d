//! Shared test utilities available to both unit and integration tests.
//!
//! Enabled via `#[cfg(test)]` (unit tests) or the `testkit` feature
//! (integration tests).
//!
//! # Modules
//!
//! - [`transport`] - `ScriptedConnector` and the channel-backed transport it
//!   hands out, with a `TransportLink` control handle per connection.
//! - [`handler`] - `RecordingHandler`, a connection handler that records
//!   messages and fresh connects.
//! - [`gateway`] - `RecordingGateway`, an order gateway with scripted
//!   latency and failures that tracks call order and concurrency.
//! - [`config`] - Canonical test configurations.

pub mod config;
pub mod gateway;
pub mod handler;
pub mod transport;

/// Yield to other tasks until `condition` holds.
///
/// Does not advance the (possibly paused) Tokio clock. Returns whether the
/// condition was eventually met.
pub async fn eventually<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..10_000 {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
