//! Outbound payloads.

use serde::Serialize;

use crate::error::Result;

/// A frame to write on the connection.
///
/// Raw text is written verbatim; structured payloads are JSON-encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Raw(String),
    Json(serde_json::Value),
}

impl Outbound {
    /// Build a structured payload from any serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Encode into the text frame written to the transport.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Raw(text) => Ok(text),
            Self::Json(value) => Ok(serde_json::to_string(&value)?),
        }
    }
}

impl From<String> for Outbound {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<&str> for Outbound {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

impl From<serde_json::Value> for Outbound {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_text_is_not_reencoded() {
        let frame = Outbound::from(r#"{"type":"ping"}"#).into_text().unwrap();
        assert_eq!(frame, r#"{"type":"ping"}"#);
    }

    #[test]
    fn structured_payload_is_json_encoded() {
        #[derive(Serialize)]
        struct Subscribe<'a> {
            r#type: &'a str,
            channel: &'a str,
        }

        let frame = Outbound::json(&Subscribe {
            r#type: "subscribe",
            channel: "v4_trades",
        })
        .unwrap()
        .into_text()
        .unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed, json!({"type": "subscribe", "channel": "v4_trades"}));
    }

    #[test]
    fn json_string_value_keeps_quotes() {
        let frame = Outbound::from(json!("hello")).into_text().unwrap();
        assert_eq!(frame, "\"hello\"");
    }
}
