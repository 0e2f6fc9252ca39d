//! Recording [`OrderGateway`] with scripted latency and failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::error::{Error, QueueError, Result};
use crate::port::OrderGateway;

/// A scripted gateway call: a label, how long it takes, and how it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub label: String,
    pub latency: Duration,
    pub fails: bool,
    pub panics: bool,
}

impl ScriptedCall {
    pub fn ok(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            latency: Duration::ZERO,
            fails: false,
            panics: false,
        }
    }

    pub fn failing(label: impl Into<String>) -> Self {
        Self {
            fails: true,
            ..Self::ok(label)
        }
    }

    /// Panic inside the gateway once the latency has elapsed.
    pub fn panicking(label: impl Into<String>) -> Self {
        Self {
            panics: true,
            ..Self::ok(label)
        }
    }

    #[must_use]
    pub fn after(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// A gateway call as observed by [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// `place:<label>`, `cancel:<label>`, or `cancel_all:<market>`.
    pub name: String,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

#[derive(Default)]
struct GatewayLog {
    calls: Mutex<Vec<CallRecord>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Gateway that sleeps for each call's latency and records everything.
///
/// Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    log: Arc<GatewayLog>,
    supports_cancel_all: bool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `cancel_all` instead of rejecting it as unsupported.
    #[must_use]
    pub fn with_cancel_all(mut self) -> Self {
        self.supports_cancel_all = true;
        self
    }

    /// Call names in the order the calls started.
    pub fn started(&self) -> Vec<String> {
        self.log.calls.lock().iter().map(|c| c.name.clone()).collect()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.log.calls.lock().clone()
    }

    /// Highest number of calls ever running at once.
    pub fn max_in_flight(&self) -> usize {
        self.log.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, name: String, call: Option<ScriptedCall>) -> Result<String> {
        let index = {
            let mut calls = self.log.calls.lock();
            calls.push(CallRecord {
                name: name.clone(),
                started_at: Instant::now(),
                finished_at: None,
            });
            calls.len() - 1
        };
        let now_running = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log
            .max_in_flight
            .fetch_max(now_running, Ordering::SeqCst);

        let (latency, fails, panics) = call.map_or((Duration::ZERO, false, false), |c| {
            (c.latency, c.fails, c.panics)
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.log.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.log.calls.lock()[index].finished_at = Some(Instant::now());

        if panics {
            panic!("{name} blew up");
        }
        if fails {
            Err(Error::Gateway(format!("{name} rejected")))
        } else {
            Ok(name)
        }
    }
}

#[async_trait]
impl OrderGateway for RecordingGateway {
    type Place = ScriptedCall;
    type Cancel = ScriptedCall;
    type Receipt = String;

    async fn place(&self, order: ScriptedCall) -> Result<String> {
        self.run(format!("place:{}", order.label), Some(order)).await
    }

    async fn cancel(&self, order: ScriptedCall) -> Result<String> {
        self.run(format!("cancel:{}", order.label), Some(order)).await
    }

    async fn cancel_all(&self, market: Option<String>) -> Result<String> {
        if !self.supports_cancel_all {
            return Err(QueueError::UnsupportedOperation {
                operation: "cancel_all",
            }
            .into());
        }
        let name = format!("cancel_all:{}", market.as_deref().unwrap_or("*"));
        self.run(name, None).await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
