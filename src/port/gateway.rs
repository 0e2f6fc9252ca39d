//! Order gateway port.

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::{QueueError, Result};

/// Backend that actually places and cancels orders.
///
/// Signing, broadcasting, and any retry or timeout policy live behind this
/// trait; the submission queue only guarantees ordering.
#[async_trait]
pub trait OrderGateway: Send + Sync + 'static {
    /// Payload describing an order to place.
    type Place: Debug + Send + 'static;
    /// Payload identifying an order to cancel.
    type Cancel: Debug + Send + 'static;
    /// Result of a successful operation.
    type Receipt: Send + 'static;

    /// Place an order.
    async fn place(&self, order: Self::Place) -> Result<Self::Receipt>;

    /// Cancel an order.
    async fn cancel(&self, order: Self::Cancel) -> Result<Self::Receipt>;

    /// Cancel every open order, optionally restricted to one market.
    ///
    /// Gateways without bulk cancellation keep the default, which rejects
    /// the operation.
    async fn cancel_all(&self, market: Option<String>) -> Result<Self::Receipt> {
        let _ = market;
        Err(QueueError::UnsupportedOperation {
            operation: "cancel_all",
        }
        .into())
    }

    /// Gateway name for logging.
    fn name(&self) -> &'static str {
        "gateway"
    }
}

/// [`OrderGateway`] built from a pair of async closures.
///
/// ```no_run
/// use tradelink::port::FnGateway;
///
/// let gateway = FnGateway::<u64, String, _, _>::new(
///     |price: u64| async move { Ok::<_, tradelink::Error>(format!("placed at {price}")) },
///     |id: String| async move { Ok::<_, tradelink::Error>(format!("cancelled {id}")) },
/// );
/// ```
pub struct FnGateway<PArg, CArg, P, C> {
    place: P,
    cancel: C,
    _marker: PhantomData<fn(PArg, CArg)>,
}

impl<PArg, CArg, P, C> FnGateway<PArg, CArg, P, C> {
    pub fn new(place: P, cancel: C) -> Self {
        Self {
            place,
            cancel,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<PArg, CArg, P, C, PFut, CFut, R> OrderGateway for FnGateway<PArg, CArg, P, C>
where
    PArg: Debug + Send + 'static,
    CArg: Debug + Send + 'static,
    P: Fn(PArg) -> PFut + Send + Sync + 'static,
    C: Fn(CArg) -> CFut + Send + Sync + 'static,
    PFut: Future<Output = Result<R>> + Send + 'static,
    CFut: Future<Output = Result<R>> + Send + 'static,
    R: Send + 'static,
{
    type Place = PArg;
    type Cancel = CArg;
    type Receipt = R;

    async fn place(&self, order: PArg) -> Result<R> {
        (self.place)(order).await
    }

    async fn cancel(&self, order: CArg) -> Result<R> {
        (self.cancel)(order).await
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}
