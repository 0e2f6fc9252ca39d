//! Driver task owning the transport and the reconnect schedule.

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::state::Phase;
use super::{ConnectionHandle, ConnectionHandler};
use crate::port::{Connector, Transport, TransportEvent};

/// Why a transport stopped being pumped.
enum PumpExit {
    /// Peer close, transport failure, or end of stream.
    Closed,
    /// `restart()` was requested.
    Restart,
    /// `teardown()` was requested.
    Terminated,
}

pub(super) async fn drive<C, H>(
    handle: ConnectionHandle,
    connector: C,
    handler: H,
    mut backoff: Backoff,
    mut terminate: watch::Receiver<bool>,
) where
    C: Connector,
    H: ConnectionHandler,
{
    let endpoint = handle.endpoint().to_string();
    let mut connection_id = 0u64;

    loop {
        connection_id += 1;
        if !handle.shared.transition(Phase::Connecting { connection_id }) {
            break;
        }
        debug!(connection_id, endpoint = %endpoint, "Connecting");

        let attempt = tokio::select! {
            biased;
            _ = terminated(&mut terminate) => break,
            attempt = connector.connect(&endpoint) => attempt,
        };

        let reconnect_now = match attempt {
            Ok(mut transport) => {
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                let opened = handle.shared.transition(Phase::Open {
                    connection_id,
                    outbound: outbound_tx,
                });
                if !opened {
                    transport.close().await;
                    break;
                }

                backoff.reset();
                info!(connection_id, endpoint = %endpoint, "Connected");
                handler.on_fresh_connect(&handle);

                let exit = pump(
                    &handle,
                    &mut transport,
                    outbound_rx,
                    &handler,
                    &mut terminate,
                    connection_id,
                )
                .await;

                match exit {
                    PumpExit::Terminated => {
                        transport.close().await;
                        break;
                    }
                    PumpExit::Restart => {
                        transport.close().await;
                        true
                    }
                    PumpExit::Closed => false,
                }
            }
            Err(e) => {
                warn!(connection_id, endpoint = %endpoint, error = %e, "Connection attempt failed");
                false
            }
        };

        if reconnect_now {
            continue;
        }

        let delay = backoff.next_delay();
        if !handle.shared.transition(Phase::Closed { retry_in: delay }) {
            break;
        }
        info!(
            delay_ms = delay.as_millis() as u64,
            failures = backoff.failures(),
            "Reconnecting after delay"
        );

        tokio::select! {
            biased;
            _ = terminated(&mut terminate) => break,
            _ = handle.shared.restart.notified() => {
                debug!("Restart requested, skipping remaining backoff");
            }
            _ = sleep(delay) => {}
        }
    }

    debug!(endpoint = %endpoint, "Connection driver stopped");
}

async fn pump<T, H>(
    handle: &ConnectionHandle,
    transport: &mut T,
    mut outbound: mpsc::UnboundedReceiver<String>,
    handler: &H,
    terminate: &mut watch::Receiver<bool>,
    connection_id: u64,
) -> PumpExit
where
    T: Transport,
    H: ConnectionHandler,
{
    loop {
        tokio::select! {
            biased;
            _ = terminated(terminate) => return PumpExit::Terminated,
            _ = handle.shared.restart.notified() => return PumpExit::Restart,
            Some(text) = outbound.recv() => {
                if let Err(e) = transport.send_text(text).await {
                    warn!(connection_id, error = %e, "Failed to send frame");
                }
            }
            event = transport.next_event() => match event {
                Some(TransportEvent::Text(text)) => {
                    dispatch(handler, handle, &text, connection_id);
                }
                Some(TransportEvent::Closed(close)) => {
                    if close.is_expected() {
                        info!(connection_id, code = close.code, reason = %close.reason, "Connection closed");
                    } else {
                        warn!(connection_id, code = close.code, reason = %close.reason, "Connection closed abnormally");
                    }
                    return PumpExit::Closed;
                }
                Some(TransportEvent::Failed(reason)) => {
                    warn!(connection_id, reason = %reason, "Transport failed");
                    return PumpExit::Closed;
                }
                None => {
                    info!(connection_id, "Transport stream ended");
                    return PumpExit::Closed;
                }
            },
        }
    }
}

/// Resolves once teardown has been requested.
async fn terminated(terminate: &mut watch::Receiver<bool>) {
    let _ = terminate.wait_for(|terminated| *terminated).await;
}

fn dispatch<H: ConnectionHandler>(
    handler: &H,
    handle: &ConnectionHandle,
    text: &str,
    connection_id: u64,
) {
    match serde_json::from_str::<H::Message>(text) {
        Ok(message) => handler.on_message(message, handle),
        Err(e) => {
            warn!(connection_id, error = %e, raw = %text, "Failed to parse message");
        }
    }
}
