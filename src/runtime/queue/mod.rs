//! Ordered submission queue.
//!
//! Place and cancel operations mutate shared remote state (an account's
//! position on the book), so running them concurrently or out of order can
//! corrupt intent. [`SubmissionQueue`] runs them one at a time in arrival
//! order:
//!
//! - [`enqueue`](SubmissionQueue::enqueue) appends and returns immediately,
//!   starting the worker if it is idle.
//! - The worker takes the head's operation, runs it against the
//!   [`OrderGateway`], reports the outcome through the submission's
//!   callbacks, and only then removes the head.
//! - A failed operation is dropped, never retried, and never blocks the
//!   entries behind it.

mod submission;

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

pub use submission::{OnFailed, OnSent, Operation, OperationKind, Submission};

use crate::error::{QueueError, Result};
use crate::port::OrderGateway;

/// Identifier assigned to each enqueued submission, increasing in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl SubmissionId {
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a queue entry. `Sent` and `Failed` are terminal and are
/// immediately followed by removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Pending,
    Sent,
    Failed,
}

struct Entry<G: OrderGateway> {
    id: SubmissionId,
    state: EntryState,
    /// Taken by the worker when this entry reaches the head.
    submission: Option<Submission<G>>,
    enqueued_at: Instant,
}

struct QueueState<G: OrderGateway> {
    entries: VecDeque<Entry<G>>,
    processing: bool,
}

struct Inner<G: OrderGateway> {
    gateway: G,
    state: Mutex<QueueState<G>>,
    next_id: AtomicU64,
}

/// FIFO, single-flight executor for order operations.
///
/// Cloning yields another handle to the same queue.
pub struct SubmissionQueue<G: OrderGateway> {
    inner: Arc<Inner<G>>,
}

impl<G: OrderGateway> Clone for SubmissionQueue<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: OrderGateway> SubmissionQueue<G> {
    pub fn new(gateway: G) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                state: Mutex::new(QueueState {
                    entries: VecDeque::new(),
                    processing: false,
                }),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Append a submission and start the worker if it is idle.
    ///
    /// Never blocks and never fails; the outcome is reported through the
    /// submission's callbacks. Must be called from within a Tokio runtime.
    pub fn enqueue(&self, submission: Submission<G>) -> SubmissionId {
        let id = SubmissionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let kind = submission.kind();

        let start_worker = {
            let mut state = self.inner.state.lock();
            state.entries.push_back(Entry {
                id,
                state: EntryState::Pending,
                submission: Some(submission),
                enqueued_at: Instant::now(),
            });
            debug!(id = %id, kind = %kind, depth = state.entries.len(), "Submission enqueued");

            !std::mem::replace(&mut state.processing, true)
        };

        if start_worker {
            tokio::spawn(process(Arc::clone(&self.inner)));
        }

        id
    }

    /// Enqueue `operation` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the gateway's error if the operation failed, or
    /// [`QueueError::Abandoned`] if the worker stopped before reporting.
    pub async fn submit(&self, operation: Operation<G>) -> Result<G::Receipt> {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let tx_failed = Arc::clone(&tx);

        let submission = Submission::new(operation)
            .on_sent(move |receipt| {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(receipt));
                }
            })
            .on_failed(move |error| {
                if let Some(tx) = tx_failed.lock().take() {
                    let _ = tx.send(Err(error));
                }
            });

        let id = self.enqueue(submission);
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::Abandoned { id: id.value() }.into()),
        }
    }

    /// Number of entries not yet removed, including the one in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the worker is currently running.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }
}

/// Worker loop: drains the queue head-first, then clears `processing`.
async fn process<G: OrderGateway>(inner: Arc<Inner<G>>) {
    loop {
        let (id, submission, waited) = {
            let mut state = inner.state.lock();
            match state.entries.front_mut() {
                Some(entry) => (entry.id, entry.submission.take(), entry.enqueued_at.elapsed()),
                None => {
                    state.processing = false;
                    debug!("Submission queue drained");
                    return;
                }
            }
        };

        let mut head = HeadGuard {
            inner: &inner,
            id,
            outcome: EntryState::Failed,
        };
        if let Some(submission) = submission {
            head.outcome = execute(&inner.gateway, id, submission, waited).await;
        }
    }
}

async fn execute<G: OrderGateway>(
    gateway: &G,
    id: SubmissionId,
    submission: Submission<G>,
    waited: Duration,
) -> EntryState {
    let Submission {
        operation,
        on_sent,
        on_failed,
    } = submission;
    let kind = operation.kind();

    info!(
        id = %id,
        kind = %kind,
        gateway = gateway.name(),
        waited_ms = waited.as_millis() as u64,
        operation = ?operation,
        "Attempting operation"
    );
    let started = Instant::now();

    let dispatch = async move {
        match operation {
            Operation::Place(order) => gateway.place(order).await,
            Operation::Cancel(order) => gateway.cancel(order).await,
            Operation::CancelAll { market } => gateway.cancel_all(market).await,
        }
    };
    let result = AssertUnwindSafe(dispatch)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(QueueError::GatewayPanicked {
                operation: kind.as_str(),
                message: panic_message(payload.as_ref()),
            }
            .into())
        });
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(receipt) => {
            info!(id = %id, kind = %kind, elapsed_ms, "Operation sent");
            if let Some(on_sent) = on_sent {
                on_sent(receipt);
            }
            EntryState::Sent
        }
        Err(e) => {
            warn!(id = %id, kind = %kind, elapsed_ms, error = %e, "Operation failed, dropping submission");
            if let Some(on_failed) = on_failed {
                on_failed(e);
            }
            EntryState::Failed
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Removes the head entry when dropped, whatever happened while it ran.
struct HeadGuard<'a, G: OrderGateway> {
    inner: &'a Arc<Inner<G>>,
    id: SubmissionId,
    outcome: EntryState,
}

impl<G: OrderGateway> Drop for HeadGuard<'_, G> {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if state.entries.front().is_some_and(|entry| entry.id == self.id) {
            if let Some(mut entry) = state.entries.pop_front() {
                entry.state = self.outcome;
                debug!(
                    id = %entry.id,
                    state = ?entry.state,
                    remaining = state.entries.len(),
                    "Submission removed"
                );
            }
        }
        // A panicking callback kills this worker; hand the rest of the queue to a new one.
        if std::thread::panicking() {
            if state.entries.is_empty() {
                state.processing = false;
            } else {
                warn!(remaining = state.entries.len(), "Submission worker panicked, restarting");
                tokio::spawn(process(Arc::clone(self.inner)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::port::FnGateway;

    fn echo_gateway() -> impl OrderGateway<Place = u32, Cancel = u32, Receipt = String> {
        FnGateway::new(
            |price: u32| async move { Ok::<_, Error>(format!("placed {price}")) },
            |id: u32| async move { Ok::<_, Error>(format!("cancelled {id}")) },
        )
    }

    #[tokio::test]
    async fn ids_increase_in_arrival_order() {
        let queue = SubmissionQueue::new(echo_gateway());

        let first = queue.enqueue(Submission::place(1));
        let second = queue.enqueue(Submission::cancel(1));

        assert!(first < second);
        assert_eq!(first.value() + 1, second.value());
    }

    #[tokio::test]
    async fn submit_returns_receipt() {
        let queue = SubmissionQueue::new(echo_gateway());

        let receipt = queue.submit(Operation::Place(10)).await.unwrap();

        assert_eq!(receipt, "placed 10");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn cancel_all_is_unsupported_without_gateway_support() {
        let queue = SubmissionQueue::new(echo_gateway());

        let result = queue.submit(Operation::CancelAll { market: None }).await;

        assert!(matches!(
            result,
            Err(Error::Queue(QueueError::UnsupportedOperation {
                operation: "cancel_all"
            }))
        ));
    }

    #[tokio::test]
    async fn worker_stops_when_drained() {
        let queue = SubmissionQueue::new(echo_gateway());

        queue.submit(Operation::Cancel(3)).await.unwrap();
        tokio::task::yield_now().await;

        assert!(!queue.is_processing());
        assert_eq!(queue.len(), 0);
    }
}
