//! Subscription registry and consumer handles.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::message::IndexerRequest;
use crate::error::Result;
use crate::runtime::connection::{ConnectionHandle, Outbound};

/// Data delivered to a [`ChannelSubscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Initial snapshot sent when the subscription is acknowledged.
    BaseData(Value),
    /// Incremental updates, one element per update.
    Updates(Vec<Value>),
}

/// Identifies a subscription: a channel plus an optional id within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) struct SubscriptionKey {
    pub channel: String,
    pub id: Option<String>,
}

impl SubscriptionKey {
    pub fn new(channel: impl Into<String>, id: Option<String>) -> Self {
        Self {
            channel: channel.into(),
            id,
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}/{}", self.channel, id),
            None => f.write_str(&self.channel),
        }
    }
}

pub(super) struct SubscriptionEntry {
    /// Distinguishes this registration from a later one under the same key.
    pub token: u64,
    pub batched: bool,
    pub events: mpsc::UnboundedSender<ChannelEvent>,
    pub sent_subscribe: bool,
    pub received_base_data: bool,
    /// First time a subscribe for this registration went out.
    pub first_subscribed_at: Option<Instant>,
    pub last_fetch_retry: Option<Instant>,
    pub last_duplicate_retry: Option<Instant>,
}

#[derive(Default)]
pub(super) struct Registry {
    pub entries: HashMap<SubscriptionKey, SubscriptionEntry>,
    next_token: u64,
}

impl Registry {
    pub fn insert(
        &mut self,
        key: SubscriptionKey,
        batched: bool,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Option<u64> {
        if self.entries.contains_key(&key) {
            return None;
        }
        self.next_token += 1;
        let token = self.next_token;
        self.entries.insert(
            key,
            SubscriptionEntry {
                token,
                batched,
                events,
                sent_subscribe: false,
                received_base_data: false,
                first_subscribed_at: None,
                last_fetch_retry: None,
                last_duplicate_retry: None,
            },
        );
        Some(token)
    }
}

/// Send a subscribe request for `entry` if the connection is open.
pub(super) fn send_subscribe(
    connection: &ConnectionHandle,
    key: &SubscriptionKey,
    entry: &mut SubscriptionEntry,
) {
    entry.received_base_data = false;
    if !connection.is_active() {
        entry.sent_subscribe = false;
        return;
    }
    let request = IndexerRequest::Subscribe {
        channel: &key.channel,
        id: key.id.as_deref(),
        batched: entry.batched,
    };
    match send_request(connection, &request) {
        Ok(()) => {
            entry.sent_subscribe = true;
            entry.first_subscribed_at.get_or_insert_with(Instant::now);
        }
        Err(e) => {
            entry.sent_subscribe = false;
            debug!(subscription = %key, error = %e, "Subscribe request not sent");
        }
    }
}

/// Send an unsubscribe request if a subscribe went out on this connection.
pub(super) fn send_unsubscribe(
    connection: &ConnectionHandle,
    key: &SubscriptionKey,
    entry: &mut SubscriptionEntry,
) {
    if !std::mem::take(&mut entry.sent_subscribe) || !connection.is_active() {
        return;
    }
    let request = IndexerRequest::Unsubscribe {
        channel: &key.channel,
        id: key.id.as_deref(),
    };
    if let Err(e) = send_request(connection, &request) {
        debug!(subscription = %key, error = %e, "Unsubscribe request not sent");
    }
}

fn send_request(connection: &ConnectionHandle, request: &IndexerRequest<'_>) -> Result<()> {
    connection.send(Outbound::json(request)?)
}

/// A live channel subscription.
///
/// Dropping it unregisters the subscription and, when the indexer was told
/// about it on the current connection, sends an unsubscribe request.
pub struct ChannelSubscription {
    pub(super) key: SubscriptionKey,
    pub(super) token: u64,
    pub(super) events: mpsc::UnboundedReceiver<ChannelEvent>,
    pub(super) registry: Arc<Mutex<Registry>>,
    pub(super) connection: ConnectionHandle,
}

impl ChannelSubscription {
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.key.channel
    }

    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.key.id.as_deref()
    }

    /// Wait for the next event. Returns `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// The next event, if one is already waiting.
    pub fn try_recv(&mut self) -> Option<ChannelEvent> {
        self.events.try_recv().ok()
    }

    /// Unregister now. Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for ChannelSubscription {
    fn drop(&mut self) {
        let mut registry = self.registry.lock();
        let owned = registry
            .entries
            .get(&self.key)
            .is_some_and(|entry| entry.token == self.token);
        if !owned {
            return;
        }
        if let Some(mut entry) = registry.entries.remove(&self.key) {
            send_unsubscribe(&self.connection, &self.key, &mut entry);
            debug!(subscription = %self.key, "Subscription removed");
        }
    }
}
