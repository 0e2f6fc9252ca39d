//! WebSocket transport over `tokio-tungstenite`.
//!
//! [`WsConnector`] opens a TLS-capable WebSocket to an endpoint and hands the
//! stream to the resilient connection as a [`WsTransport`]. Frame handling:
//!
//! - **Text**: passed through unchanged.
//! - **Binary**: passed through as text when it is valid UTF-8, otherwise dropped.
//! - **Ping**: answered with a Pong carrying the same payload.
//! - **Close**: reported with its code and reason (1005 when the peer sent none).
//! - **Errors**: reported as a failure; the transport is dead afterwards.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::port::{CloseInfo, Connector, Transport, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&self, endpoint: &str) -> Result<WsTransport> {
        debug!(url = %endpoint, "Opening WebSocket");

        let (ws, response) = connect_async(endpoint).await?;

        info!(url = %endpoint, status = %response.status(), "WebSocket connected");
        Ok(WsTransport { ws })
    }
}

/// An open WebSocket stream.
pub struct WsTransport {
    ws: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.ws.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            let frame = self.ws.next().await?;
            match frame {
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(TransportEvent::Text(text)),
                    Err(e) => warn!(error = %e, "Dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Ping(data)) => {
                    debug!("Received ping");
                    if let Err(e) = self.ws.send(Message::Pong(data)).await {
                        return Some(TransportEvent::Failed(e.to_string()));
                    }
                }
                Ok(Message::Close(frame)) => {
                    let close = frame.map_or_else(
                        || CloseInfo::new(CloseInfo::NO_STATUS, ""),
                        |f| CloseInfo::new(u16::from(f.code), f.reason.into_owned()),
                    );
                    return Some(TransportEvent::Closed(close));
                }
                Ok(_) => {}
                Err(e) => return Some(TransportEvent::Failed(e.to_string())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}
