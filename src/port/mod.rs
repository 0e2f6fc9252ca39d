//! Trait definitions (hexagonal ports).
//!
//! Ports are the seams where external systems plug in:
//!
//! - [`Connector`] / [`Transport`] - the raw streaming socket consumed by
//!   [`ResilientConnection`](crate::runtime::connection::ResilientConnection)
//! - [`OrderGateway`] - the signing/broadcasting backend driven by
//!   [`SubmissionQueue`](crate::runtime::queue::SubmissionQueue)

mod gateway;
mod transport;

pub use gateway::{FnGateway, OrderGateway};
pub use transport::{CloseInfo, Connector, Transport, TransportEvent};
