//! Scripted [`Connector`] and channel-backed [`Transport`] for testing.
//!
//! [`ScriptedConnector`] answers each `connect()` with the next scripted
//! [`ConnectOutcome`] (falling back to a fixed outcome when the script runs
//! out) and records when every attempt happened. Each accepted connection
//! yields a [`TransportLink`] on the [`ConnectorProbe`], through which a test
//! pushes inbound frames, closes the transport, and inspects what was sent.
//!
//! Keep links alive for as long as the connection should stay open:
//! dropping a link ends its transport's stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{ConnectionError, Result};
use crate::port::{CloseInfo, Connector, Transport, TransportEvent};

/// How a scripted connect attempt resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Open a channel transport.
    Accept,
    /// Fail the attempt with the given reason.
    Refuse(String),
    /// Never resolve.
    Hang,
}

struct ConnectorLog {
    outcomes: Mutex<VecDeque<ConnectOutcome>>,
    fallback: ConnectOutcome,
    attempts: Mutex<Vec<Instant>>,
    links: mpsc::UnboundedSender<TransportLink>,
}

/// A connector driven by a script of outcomes.
#[derive(Clone)]
pub struct ScriptedConnector {
    log: Arc<ConnectorLog>,
}

/// Observation side of a [`ScriptedConnector`].
pub struct ConnectorProbe {
    log: Arc<ConnectorLog>,
    links: mpsc::UnboundedReceiver<TransportLink>,
}

impl ScriptedConnector {
    /// Play `outcomes` in order, then `fallback` forever.
    pub fn scripted(
        outcomes: Vec<ConnectOutcome>,
        fallback: ConnectOutcome,
    ) -> (Self, ConnectorProbe) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::new(ConnectorLog {
            outcomes: Mutex::new(outcomes.into()),
            fallback,
            attempts: Mutex::new(Vec::new()),
            links: tx,
        });
        (
            Self { log: log.clone() },
            ConnectorProbe { log, links: rx },
        )
    }

    /// Every attempt fails.
    pub fn refusing() -> (Self, ConnectorProbe) {
        Self::scripted(Vec::new(), ConnectOutcome::Refuse("connection refused".into()))
    }

    /// Every attempt succeeds.
    pub fn accepting() -> (Self, ConnectorProbe) {
        Self::scripted(Vec::new(), ConnectOutcome::Accept)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = ChannelTransport;

    async fn connect(&self, endpoint: &str) -> Result<ChannelTransport> {
        self.log.attempts.lock().push(Instant::now());
        let outcome = self
            .log
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.log.fallback.clone());

        match outcome {
            ConnectOutcome::Accept => {
                let (transport, link) = channel_transport();
                let _ = self.log.links.send(link);
                Ok(transport)
            }
            ConnectOutcome::Refuse(reason) => Err(ConnectionError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason,
            }
            .into()),
            ConnectOutcome::Hang => std::future::pending().await,
        }
    }
}

impl ConnectorProbe {
    /// Number of connect attempts so far.
    pub fn attempt_count(&self) -> usize {
        self.log.attempts.lock().len()
    }

    /// When each attempt started.
    pub fn attempts(&self) -> Vec<Instant> {
        self.log.attempts.lock().clone()
    }

    /// Time between consecutive attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.attempts()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    /// Wait for the next accepted connection.
    pub async fn next_link(&mut self) -> TransportLink {
        self.links
            .recv()
            .await
            .expect("connector dropped before accepting a connection")
    }

    /// The next accepted connection, if one is already waiting.
    pub fn try_next_link(&mut self) -> Option<TransportLink> {
        self.links.try_recv().ok()
    }
}

/// Transport fed by a [`TransportLink`].
pub struct ChannelTransport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicU32>,
}

/// Test-side control of one [`ChannelTransport`].
pub struct TransportLink {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    close_calls: Arc<AtomicU32>,
}

/// Create a connected transport/link pair.
pub fn channel_transport() -> (ChannelTransport, TransportLink) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let close_calls = Arc::new(AtomicU32::new(0));
    (
        ChannelTransport {
            events: rx,
            sent: sent.clone(),
            closed: closed.clone(),
            close_calls: close_calls.clone(),
        },
        TransportLink {
            events: tx,
            sent,
            closed,
            close_calls,
        },
    )
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::TransportClosed("channel transport closed".into()).into());
        }
        self.sent.lock().push(text);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl TransportLink {
    /// Deliver an inbound text frame.
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Text(text.into()));
    }

    /// Deliver an inbound JSON frame.
    pub fn push_json(&self, value: &serde_json::Value) {
        self.push_text(value.to_string());
    }

    /// Simulate the peer closing with `code`.
    pub fn close(&self, code: u16) {
        let _ = self
            .events
            .send(TransportEvent::Closed(CloseInfo::new(code, "")));
    }

    /// Simulate a transport failure.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.events.send(TransportEvent::Failed(reason.into()));
    }

    /// Frames written by the connection, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Whether the connection closed this transport from its side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }
}
