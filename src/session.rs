//! Trading session: the streaming feed and the order queue, owned together.
//!
//! A session is built once at startup and passed explicitly to whatever
//! needs market data or order submission. There is no global instance.

use tracing::info;

use crate::adapter::IndexerFeed;
use crate::port::OrderGateway;
use crate::runtime::queue::SubmissionQueue;

pub struct TradingSession<G: OrderGateway> {
    feed: IndexerFeed,
    orders: SubmissionQueue<G>,
}

impl<G: OrderGateway> TradingSession<G> {
    pub fn new(feed: IndexerFeed, orders: SubmissionQueue<G>) -> Self {
        info!(feed_id = %feed.feed_id(), gateway = orders.gateway().name(), "Trading session created");
        Self { feed, orders }
    }

    #[must_use]
    pub fn feed(&self) -> &IndexerFeed {
        &self.feed
    }

    #[must_use]
    pub fn orders(&self) -> &SubmissionQueue<G> {
        &self.orders
    }

    /// Stop the feed. Submissions already queued still run to completion.
    pub async fn shutdown(self) {
        let pending = self.orders.len();
        self.feed.shutdown().await;
        info!(pending_submissions = pending, "Trading session stopped");
    }
}
