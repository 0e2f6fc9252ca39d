//! Indexer wire messages.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound indexer message, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexerMessage {
    Connected {
        #[serde(default)]
        connection_id: Option<String>,
        #[serde(default)]
        message_id: Option<u64>,
    },
    Subscribed {
        channel: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        contents: Value,
    },
    Unsubscribed {
        channel: String,
        #[serde(default)]
        id: Option<String>,
    },
    ChannelData {
        channel: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        contents: Value,
    },
    ChannelBatchData {
        channel: String,
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        version: Option<String>,
        #[serde(default)]
        contents: Vec<Value>,
    },
    Error {
        message: String,
        #[serde(default)]
        channel: Option<String>,
        #[serde(default)]
        id: Option<String>,
    },
}

/// Outbound subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexerRequest<'a> {
    Subscribe {
        channel: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<&'a str>,
        batched: bool,
    },
    Unsubscribe {
        channel: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<&'a str>,
    },
}

const FETCH_FAILED_PREFIX: &str = "Internal error, could not fetch data for subscription: ";
const ALREADY_SUBSCRIBED_PREFIX: &str = "Invalid subscribe message: already subscribed (";

/// Server errors the feed knows how to recover from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum RecoverableError {
    /// The indexer failed to load initial data for a subscription.
    FetchFailed,
    /// The indexer still holds a subscription the feed thinks is new.
    AlreadySubscribed,
}

/// Classify an error message, returning the target it names.
///
/// Fetch failures carry the target in the message's `channel`/`id` fields;
/// duplicate-subscription errors only name it inside the text, as
/// `(<channel>-<id>)`, with the id repeating the channel when there is none.
pub(super) fn classify_error(
    message: &str,
    channel: Option<&str>,
    id: Option<&str>,
) -> Option<(RecoverableError, String, Option<String>)> {
    if message.starts_with(FETCH_FAILED_PREFIX) {
        let channel = channel?;
        return Some((
            RecoverableError::FetchFailed,
            channel.to_string(),
            id.map(str::to_string),
        ));
    }

    let rest = message.strip_prefix(ALREADY_SUBSCRIBED_PREFIX)?;
    let (target, _) = rest.split_once(')')?;
    let (channel, id) = target.split_once('-')?;
    if channel.is_empty()
        || id.is_empty()
        || !channel.chars().all(|c| c.is_alphanumeric() || c == '_')
    {
        return None;
    }
    let id = (id != channel).then(|| id.to_string());
    Some((RecoverableError::AlreadySubscribed, channel.to_string(), id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_batch_data() {
        let message: IndexerMessage = serde_json::from_value(json!({
            "type": "channel_batch_data",
            "connection_id": "c1",
            "message_id": 7,
            "channel": "v4_trades",
            "id": "BTC-USD",
            "version": "2.1.0",
            "contents": [{"trades": []}, {"trades": []}]
        }))
        .unwrap();

        match message {
            IndexerMessage::ChannelBatchData {
                channel,
                id,
                contents,
                ..
            } => {
                assert_eq!(channel, "v4_trades");
                assert_eq!(id.as_deref(), Some("BTC-USD"));
                assert_eq!(contents.len(), 2);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn parses_subscribed_without_id() {
        let message: IndexerMessage = serde_json::from_value(json!({
            "type": "subscribed",
            "channel": "v4_markets",
            "contents": {"markets": {}}
        }))
        .unwrap();

        assert_eq!(
            message,
            IndexerMessage::Subscribed {
                channel: "v4_markets".into(),
                id: None,
                contents: json!({"markets": {}}),
            }
        );
    }

    #[test]
    fn rejects_unknown_type() {
        let result = serde_json::from_value::<IndexerMessage>(json!({"type": "mystery"}));
        assert!(result.is_err());
    }

    #[test]
    fn subscribe_request_omits_missing_id() {
        let request = IndexerRequest::Subscribe {
            channel: "v4_markets",
            id: None,
            batched: true,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"type": "subscribe", "channel": "v4_markets", "batched": true})
        );
    }

    #[test]
    fn classifies_fetch_failure_from_fields() {
        let classified = classify_error(
            "Internal error, could not fetch data for subscription: v4_orderbook",
            Some("v4_orderbook"),
            Some("ETH-USD"),
        );
        assert_eq!(
            classified,
            Some((
                RecoverableError::FetchFailed,
                "v4_orderbook".to_string(),
                Some("ETH-USD".to_string())
            ))
        );
    }

    #[test]
    fn classifies_duplicate_from_text() {
        let classified = classify_error(
            "Invalid subscribe message: already subscribed (v4_trades-BTC-USD)",
            None,
            None,
        );
        assert_eq!(
            classified,
            Some((
                RecoverableError::AlreadySubscribed,
                "v4_trades".to_string(),
                Some("BTC-USD".to_string())
            ))
        );
    }

    #[test]
    fn duplicate_with_repeated_channel_has_no_id() {
        let classified = classify_error(
            "Invalid subscribe message: already subscribed (v4_markets-v4_markets)",
            None,
            None,
        );
        assert_eq!(
            classified,
            Some((RecoverableError::AlreadySubscribed, "v4_markets".to_string(), None))
        );
    }

    #[test]
    fn other_errors_are_not_recoverable() {
        assert_eq!(classify_error("Invalid channel", Some("v4_trades"), None), None);
    }
}
