//! Indexer streaming feed.
//!
//! [`IndexerFeed`] multiplexes channel subscriptions over one
//! [`ResilientConnection`]. It remembers every registered subscription and
//! resends them all whenever a fresh transport opens, so consumers keep
//! their [`ChannelSubscription`] across reconnects without doing anything.
//!
//! The indexer occasionally fails to load a subscription's initial data, or
//! rejects a subscribe because it still holds a stale one. For `v4_`
//! channels that have not yet received base data, the feed answers either
//! error with a one-shot refresh (unsubscribe then subscribe), at most once
//! per [`RETRY_COOLDOWN`] per subscription and error kind.

mod message;
mod subscription;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub use message::{IndexerMessage, IndexerRequest};
pub use subscription::{ChannelEvent, ChannelSubscription};

use message::{classify_error, RecoverableError};
use subscription::{send_subscribe, send_unsubscribe, Registry, SubscriptionKey};

use crate::error::{FeedError, Result};
use crate::port::Connector;
use crate::runtime::connection::{
    ConnectionConfig, ConnectionHandle, ConnectionHandler, ConnectionState, ResilientConnection,
};

/// Minimum time between two error-triggered refreshes of one subscription.
pub const RETRY_COOLDOWN: Duration = Duration::from_secs(60);

/// Channel prefix of indexer channels eligible for error-triggered refresh.
const REFRESHABLE_CHANNEL_PREFIX: &str = "v4_";

/// Subscription multiplexer over a resilient indexer connection.
pub struct IndexerFeed {
    feed_id: Uuid,
    registry: Arc<Mutex<Registry>>,
    connection: ResilientConnection,
}

impl IndexerFeed {
    /// Start connecting to the indexer.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` is invalid.
    pub fn spawn<C: Connector>(config: ConnectionConfig, connector: C) -> Result<Self> {
        let feed_id = Uuid::new_v4();
        let registry = Arc::new(Mutex::new(Registry::default()));
        let handler = FeedHandler {
            feed_id,
            registry: Arc::clone(&registry),
        };
        let connection = ResilientConnection::spawn(config, connector, handler)?;
        info!(feed_id = %feed_id, endpoint = %connection.endpoint(), "Indexer feed started");

        Ok(Self {
            feed_id,
            registry,
            connection,
        })
    }

    /// Identifier of this feed in logs.
    #[must_use]
    pub const fn feed_id(&self) -> Uuid {
        self.feed_id
    }

    /// Register a subscription to `channel` (optionally narrowed to `id`).
    ///
    /// The subscribe request goes out immediately if the connection is open,
    /// and again after every reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::AlreadySubscribed`] if the same channel and id
    /// are already registered on this feed.
    pub fn subscribe(
        &self,
        channel: impl Into<String>,
        id: Option<String>,
        batched: bool,
    ) -> Result<ChannelSubscription> {
        let key = SubscriptionKey::new(channel, id);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.connection.handle();

        let token = {
            let mut registry = self.registry.lock();
            let Some(token) = registry.insert(key.clone(), batched, tx) else {
                error!(feed_id = %self.feed_id, subscription = %key, "Subscription already exists");
                return Err(FeedError::AlreadySubscribed {
                    channel: key.channel,
                    id: key.id.unwrap_or_default(),
                }
                .into());
            };
            if let Some(entry) = registry.entries.get_mut(&key) {
                send_subscribe(&handle, &key, entry);
                debug!(
                    feed_id = %self.feed_id,
                    subscription = %key,
                    sent = entry.sent_subscribe,
                    "Subscription added"
                );
            }
            token
        };

        Ok(ChannelSubscription {
            key,
            token,
            events: rx,
            registry: Arc::clone(&self.registry),
            connection: handle,
        })
    }

    /// Whether `channel`/`id` is currently registered.
    #[must_use]
    pub fn is_subscribed(&self, channel: &str, id: Option<&str>) -> bool {
        let key = SubscriptionKey::new(channel, id.map(str::to_string));
        self.registry.lock().entries.contains_key(&key)
    }

    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().entries.len()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.connection.is_active()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Drop the current transport and reconnect immediately.
    pub fn restart(&self) {
        self.connection.restart();
    }

    /// Stop the feed for good. Subscriptions stay registered but receive
    /// nothing further.
    pub fn teardown(&self) {
        self.connection.teardown();
    }

    /// Tear down and wait for the transport to close.
    pub async fn shutdown(self) {
        self.connection.shutdown().await;
    }
}

struct FeedHandler {
    feed_id: Uuid,
    registry: Arc<Mutex<Registry>>,
}

impl ConnectionHandler for FeedHandler {
    type Message = IndexerMessage;

    fn on_message(&self, message: IndexerMessage, connection: &ConnectionHandle) {
        match message {
            IndexerMessage::Connected { connection_id, .. } => {
                debug!(feed_id = %self.feed_id, connection_id = ?connection_id, "Indexer acknowledged connection");
            }
            IndexerMessage::Subscribed {
                channel,
                id,
                contents,
            } => {
                let key = SubscriptionKey::new(channel, id);
                let mut registry = self.registry.lock();
                match registry.entries.get_mut(&key) {
                    Some(entry) => {
                        entry.received_base_data = true;
                        let _ = entry.events.send(ChannelEvent::BaseData(contents));
                    }
                    None => self.unknown_target(&key),
                }
            }
            IndexerMessage::Unsubscribed { channel, id } => {
                debug!(feed_id = %self.feed_id, channel = %channel, id = ?id, "Indexer acknowledged unsubscribe");
            }
            IndexerMessage::ChannelData {
                channel,
                id,
                contents,
                ..
            } => self.deliver(SubscriptionKey::new(channel, id), vec![contents]),
            IndexerMessage::ChannelBatchData {
                channel,
                id,
                contents,
                ..
            } => self.deliver(SubscriptionKey::new(channel, id), contents),
            IndexerMessage::Error {
                message,
                channel,
                id,
            } => self.handle_error(&message, channel.as_deref(), id.as_deref(), connection),
        }
    }

    fn on_fresh_connect(&self, connection: &ConnectionHandle) {
        let mut registry = self.registry.lock();
        let count = registry.entries.len();
        for (key, entry) in &mut registry.entries {
            // The previous transport's subscriptions died with it.
            entry.sent_subscribe = false;
            send_subscribe(connection, key, entry);
        }
        info!(feed_id = %self.feed_id, subscriptions = count, "Resubscribed after fresh connect");
    }
}

impl FeedHandler {
    fn deliver(&self, key: SubscriptionKey, updates: Vec<serde_json::Value>) {
        let registry = self.registry.lock();
        match registry.entries.get(&key) {
            Some(entry) => {
                let _ = entry.events.send(ChannelEvent::Updates(updates));
            }
            None => self.unknown_target(&key),
        }
    }

    fn unknown_target(&self, key: &SubscriptionKey) {
        debug!(feed_id = %self.feed_id, subscription = %key, "Message for unknown subscription");
    }

    fn handle_error(
        &self,
        message: &str,
        channel: Option<&str>,
        id: Option<&str>,
        connection: &ConnectionHandle,
    ) {
        let Some((kind, channel, id)) = classify_error(message, channel, id) else {
            error!(feed_id = %self.feed_id, message = %message, "Indexer reported an error");
            return;
        };
        if !channel.starts_with(REFRESHABLE_CHANNEL_PREFIX) {
            error!(feed_id = %self.feed_id, message = %message, "Indexer reported an error");
            return;
        }

        let key = SubscriptionKey::new(channel, id);
        let mut registry = self.registry.lock();
        let Some(entry) = registry.entries.get_mut(&key) else {
            error!(feed_id = %self.feed_id, message = %message, "Indexer reported an error");
            return;
        };

        let now = Instant::now();
        let last_retry = match kind {
            RecoverableError::FetchFailed => &mut entry.last_fetch_retry,
            RecoverableError::AlreadySubscribed => &mut entry.last_duplicate_retry,
        };
        let cooled_down = last_retry.map_or(true, |last| now.duration_since(last) > RETRY_COOLDOWN);

        if entry.received_base_data || !cooled_down {
            let subscribed_for_ms = entry
                .first_subscribed_at
                .map(|at| now.duration_since(at).as_millis() as u64);
            warn!(
                feed_id = %self.feed_id,
                subscription = %key,
                error_kind = ?kind,
                has_base_data = entry.received_base_data,
                subscribed_for_ms = ?subscribed_for_ms,
                "Subscription error, not retrying"
            );
            return;
        }

        *last_retry = Some(now);
        send_unsubscribe(connection, &key, entry);
        send_subscribe(connection, &key, entry);
        info!(
            feed_id = %self.feed_id,
            subscription = %key,
            error_kind = ?kind,
            "Subscription error, refreshing"
        );
    }
}
