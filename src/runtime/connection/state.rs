//! Connection lifecycle states.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

/// Observable lifecycle state of a [`ResilientConnection`](super::ResilientConnection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// A connection attempt is in flight.
    Connecting,
    /// A transport is open and accepting frames.
    Open,
    /// The last transport closed or the attempt failed; a retry is scheduled.
    Closed {
        /// Wait before the next attempt.
        retry_in: Duration,
    },
    /// Torn down; no transport will ever be opened again.
    Terminated,
}

impl ConnectionState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed { retry_in } => write!(f, "closed (retry in {}ms)", retry_in.as_millis()),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Internal phase. The outbound channel only exists while `Open`.
#[derive(Debug)]
pub(super) enum Phase {
    Connecting {
        connection_id: u64,
    },
    Open {
        connection_id: u64,
        outbound: mpsc::UnboundedSender<String>,
    },
    Closed {
        retry_in: Duration,
    },
    Terminated,
}

impl Phase {
    pub(super) fn state(&self) -> ConnectionState {
        match self {
            Self::Connecting { .. } => ConnectionState::Connecting,
            Self::Open { .. } => ConnectionState::Open,
            Self::Closed { retry_in } => ConnectionState::Closed {
                retry_in: *retry_in,
            },
            Self::Terminated => ConnectionState::Terminated,
        }
    }

    pub(super) fn connection_id(&self) -> Option<u64> {
        match self {
            Self::Connecting { connection_id } | Self::Open { connection_id, .. } => {
                Some(*connection_id)
            }
            Self::Closed { .. } | Self::Terminated => None,
        }
    }
}
