//! Long-lived runtime components: the resilient streaming connection and the
//! ordered submission queue.

pub mod connection;
pub mod queue;
