//! Streaming transport port.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// Close details reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code (1005 when the peer sent no status).
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
}

impl CloseInfo {
    /// Close code used when no status code was present.
    pub const NO_STATUS: u16 = 1005;

    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Whether this close is routine rather than abnormal.
    ///
    /// 1000 (normal), 1001 (going away), 1005 (no status) and 1006 (abnormal
    /// TCP drop, extremely common on flaky networks) are all routine.
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(self.code, 1000 | 1001 | 1005 | 1006)
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {} ({})", self.code, self.reason)
        }
    }
}

/// Event produced by an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete text frame.
    Text(String),
    /// The peer closed the connection.
    Closed(CloseInfo),
    /// The transport failed; it must be considered closed.
    Failed(String),
}

/// An open, bidirectional text transport.
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Receive the next event.
    ///
    /// Returns `None` when the stream has ended. Implementations must be
    /// cancel safe: dropping the future before completion loses no frame.
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the transport. Errors are swallowed.
    async fn close(&mut self);
}

/// Factory for transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport + 'static;

    /// Open a transport to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Self::Transport>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send_text(&mut self, text: String) -> Result<()> {
        (**self).send_text(text).await
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        (**self).next_event().await
    }

    async fn close(&mut self) {
        (**self).close().await;
    }
}
