//! Implementations of ports.

pub mod indexer;
pub mod websocket;

pub use indexer::{ChannelEvent, ChannelSubscription, IndexerFeed};
pub use websocket::{WsConnector, WsTransport};
