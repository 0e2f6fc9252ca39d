//! Resilient streaming connection.
//!
//! [`ResilientConnection`] owns a single live transport to an endpoint and
//! keeps it alive: when the transport closes, fails, or cannot be opened, the
//! connection waits according to a capped exponential [`Backoff`] and tries
//! again, forever, until [`teardown`](ResilientConnection::teardown).
//!
//! # Lifecycle
//!
//! ```text
//!   spawn ──► Connecting ──ok──► Open ──close/error──► Closed{retry_in}
//!                 ▲   │                                     │
//!                 │   └──────────────fail───────────────────┤
//!                 └──────────────── wait elapsed ───────────┘
//!
//!   teardown (any state) ──► Terminated
//! ```
//!
//! Every successful open resets the backoff and calls
//! [`ConnectionHandler::on_fresh_connect`], which is where callers resend
//! their subscriptions: nothing is remembered or replayed across transports.
//!
//! Inbound text frames are parsed as JSON into the handler's message type.
//! Frames that fail to parse are logged and dropped without touching the
//! connection.

mod backoff;
mod driver;
mod outbound;
mod state;

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub use backoff::Backoff;
pub use outbound::Outbound;
pub use state::ConnectionState;

use state::Phase;

use crate::error::{ConfigError, ConnectionError, Result};
use crate::infrastructure::config::reconnection::ReconnectionConfig;
use crate::port::Connector;

/// Receives everything a [`ResilientConnection`] delivers.
///
/// Callbacks run on the connection's driver task; they should return quickly.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Inbound message type, parsed from each text frame.
    type Message: DeserializeOwned + Send;

    /// Called for every successfully parsed inbound message, in arrival order.
    fn on_message(&self, message: Self::Message, connection: &ConnectionHandle);

    /// Called exactly once per successful open, including the first.
    fn on_fresh_connect(&self, connection: &ConnectionHandle) {
        let _ = connection;
    }
}

/// Endpoint and backoff settings for a [`ResilientConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub reconnection: ReconnectionConfig,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnection: ReconnectionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_reconnection(mut self, reconnection: ReconnectionConfig) -> Self {
        self.reconnection = reconnection;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "endpoint" }.into());
        }
        Url::parse(&self.endpoint).map_err(|e| ConfigError::InvalidValue {
            field: "endpoint",
            reason: e.to_string(),
        })?;
        self.reconnection.validate()
    }
}

/// State shared between handles and the driver task.
struct Shared {
    endpoint: String,
    phase: Mutex<Phase>,
    terminate: watch::Sender<bool>,
    restart: Notify,
}

impl Shared {
    /// Move to `next` unless already terminated. Returns whether it moved.
    fn transition(&self, next: Phase) -> bool {
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::Terminated) {
            return false;
        }
        *phase = next;
        true
    }
}

/// Cloneable view of a connection, handed to handler callbacks.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.phase.lock().state()
    }

    /// True iff a transport is currently open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(*self.shared.phase.lock(), Phase::Open { .. })
    }

    /// Sequence number of the current or in-flight transport.
    #[must_use]
    pub fn connection_id(&self) -> Option<u64> {
        self.shared.phase.lock().connection_id()
    }

    /// Write a frame on the open transport.
    ///
    /// # Errors
    ///
    /// Fails immediately with [`ConnectionError::NotConnected`] when no
    /// transport is open. Frames are never buffered for a later transport.
    pub fn send(&self, message: impl Into<Outbound>) -> Result<()> {
        let text = message.into().into_text()?;

        let phase = self.shared.phase.lock();
        match &*phase {
            Phase::Open {
                outbound,
                connection_id,
            } => outbound.send(text).map_err(|_| {
                ConnectionError::TransportClosed(format!(
                    "transport {connection_id} stopped accepting frames"
                ))
                .into()
            }),
            other => {
                let state = other.state();
                warn!(
                    endpoint = %self.shared.endpoint,
                    state = %state,
                    "Attempted to send on a connection that is not open"
                );
                Err(ConnectionError::NotConnected { state }.into())
            }
        }
    }

    /// Drop the current transport and reconnect without waiting for backoff.
    ///
    /// No-op while connecting or after teardown.
    pub fn restart(&self) {
        let phase = self.shared.phase.lock();
        match &*phase {
            Phase::Open { .. } | Phase::Closed { .. } => {
                info!(
                    endpoint = %self.shared.endpoint,
                    connection_id = ?phase.connection_id(),
                    "Restart requested"
                );
                self.shared.restart.notify_one();
            }
            Phase::Connecting { .. } | Phase::Terminated => {
                debug!(state = %phase.state(), "Ignoring restart request");
            }
        }
    }

    /// Stop for good: cancel any pending wait, close the transport, and
    /// never reconnect again. Idempotent.
    ///
    /// The state is `Terminated` as soon as this returns; the transport
    /// itself is closed by the driver task shortly after.
    pub fn teardown(&self) {
        let previous = {
            let mut phase = self.shared.phase.lock();
            if phase.state().is_terminal() {
                return;
            }
            std::mem::replace(&mut *phase, Phase::Terminated)
        };
        self.shared.terminate.send_replace(true);
        info!(
            endpoint = %self.shared.endpoint,
            previous = %previous.state(),
            "Connection torn down"
        );
    }
}

/// Owner of a self-healing connection. Dropping it tears the connection down.
pub struct ResilientConnection {
    handle: ConnectionHandle,
    driver: Option<JoinHandle<()>>,
}

impl ResilientConnection {
    /// Validate `config` and start connecting immediately.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is missing or malformed
    /// or the backoff parameters are invalid. Connection failures are never
    /// returned; they schedule a retry.
    pub fn spawn<C, H>(config: ConnectionConfig, connector: C, handler: H) -> Result<Self>
    where
        C: Connector,
        H: ConnectionHandler,
    {
        config.validate()?;

        let (terminate, terminate_rx) = watch::channel(false);
        let handle = ConnectionHandle {
            shared: Arc::new(Shared {
                endpoint: config.endpoint,
                phase: Mutex::new(Phase::Connecting { connection_id: 1 }),
                terminate,
                restart: Notify::new(),
            }),
        };

        let driver = tokio::spawn(driver::drive(
            handle.clone(),
            connector,
            handler,
            Backoff::new(config.reconnection),
            terminate_rx,
        ));

        Ok(Self {
            handle,
            driver: Some(driver),
        })
    }

    /// A cloneable handle to this connection.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.handle.endpoint()
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.handle.state()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// See [`ConnectionHandle::send`].
    pub fn send(&self, message: impl Into<Outbound>) -> Result<()> {
        self.handle.send(message)
    }

    /// See [`ConnectionHandle::restart`].
    pub fn restart(&self) {
        self.handle.restart();
    }

    /// See [`ConnectionHandle::teardown`].
    pub fn teardown(&self) {
        self.handle.teardown();
    }

    /// Tear down and wait for the driver task to close the transport.
    pub async fn shutdown(mut self) {
        self.handle.teardown();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "Connection driver ended abnormally");
            }
        }
    }
}

impl Drop for ResilientConnection {
    fn drop(&mut self) {
        self.handle.teardown();
    }
}
