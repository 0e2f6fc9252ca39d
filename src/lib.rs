//! Tradelink - resilient indexer streaming and ordered order submission.
//!
//! # Architecture
//!
//! - **`runtime::connection`** - [`ResilientConnection`](runtime::connection::ResilientConnection)
//!   keeps one streaming transport alive with capped exponential backoff
//! - **`runtime::queue`** - [`SubmissionQueue`](runtime::queue::SubmissionQueue)
//!   runs order operations one at a time, in arrival order
//! - **`port`** - Seams: [`Transport`](port::Transport)/[`Connector`](port::Connector)
//!   for the wire, [`OrderGateway`](port::OrderGateway) for order execution
//! - **`adapter`** - WebSocket transport and the indexer subscription feed
//! - **`session`** - [`TradingSession`](session::TradingSession) tying feed and queue together
//!
//! # Example
//!
//! ```no_run
//! use tradelink::adapter::{IndexerFeed, WsConnector};
//! use tradelink::infrastructure::config::settings::Config;
//!
//! # async fn run() -> tradelink::Result<()> {
//! let config = Config::load("config.toml")?;
//! let feed = IndexerFeed::spawn(config.connection(), WsConnector::new())?;
//! let mut trades = feed.subscribe("v4_trades", Some("BTC-USD".into()), true)?;
//! while let Some(event) = trades.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod cli;
pub mod error;
pub mod infrastructure;
pub mod port;
pub mod runtime;
pub mod session;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use error::{Error, Result};
