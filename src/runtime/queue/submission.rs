//! Submissions accepted by the queue.

use std::fmt;

use crate::error::Error;
use crate::port::OrderGateway;

/// Callback invoked with the receipt of a successful operation.
pub type OnSent<R> = Box<dyn FnOnce(R) + Send>;

/// Callback invoked with the error of a failed operation.
pub type OnFailed = Box<dyn FnOnce(Error) + Send>;

/// Kind of operation, for logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Place,
    Cancel,
    CancelAll,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Cancel => "cancel",
            Self::CancelAll => "cancel_all",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation to run against the gateway.
pub enum Operation<G: OrderGateway> {
    Place(G::Place),
    Cancel(G::Cancel),
    /// Cancel every open order, optionally within one market.
    CancelAll { market: Option<String> },
}

impl<G: OrderGateway> Operation<G> {
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Place(_) => OperationKind::Place,
            Self::Cancel(_) => OperationKind::Cancel,
            Self::CancelAll { .. } => OperationKind::CancelAll,
        }
    }
}

impl<G: OrderGateway> fmt::Debug for Operation<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Place(order) => f.debug_tuple("Place").field(order).finish(),
            Self::Cancel(order) => f.debug_tuple("Cancel").field(order).finish(),
            Self::CancelAll { market } => {
                f.debug_struct("CancelAll").field("market", market).finish()
            }
        }
    }
}

/// An operation plus its completion callbacks.
///
/// `on_sent` only ever sees successes. Failures go to `on_failed` when one
/// is attached and are otherwise only logged.
pub struct Submission<G: OrderGateway> {
    pub(super) operation: Operation<G>,
    pub(super) on_sent: Option<OnSent<G::Receipt>>,
    pub(super) on_failed: Option<OnFailed>,
}

impl<G: OrderGateway> Submission<G> {
    pub fn new(operation: Operation<G>) -> Self {
        Self {
            operation,
            on_sent: None,
            on_failed: None,
        }
    }

    pub fn place(order: G::Place) -> Self {
        Self::new(Operation::Place(order))
    }

    pub fn cancel(order: G::Cancel) -> Self {
        Self::new(Operation::Cancel(order))
    }

    pub fn cancel_all(market: Option<String>) -> Self {
        Self::new(Operation::CancelAll { market })
    }

    #[must_use]
    pub fn on_sent(mut self, callback: impl FnOnce(G::Receipt) + Send + 'static) -> Self {
        self.on_sent = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn on_failed(mut self, callback: impl FnOnce(Error) + Send + 'static) -> Self {
        self.on_failed = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }
}

impl<G: OrderGateway> fmt::Debug for Submission<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("operation", &self.operation)
            .field("on_sent", &self.on_sent.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .finish()
    }
}
