use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use tradelink::adapter::WsConnector;
use tradelink::port::{CloseInfo, Connector, Transport, TransportEvent};

/// Accept one WebSocket client on a local port and run `script` against it.
async fn serve_once<F, Fut>(script: F) -> (String, JoinHandle<()>)
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let ws = accept_async(socket).await.unwrap();
        script(ws).await;
    });

    (format!("ws://{addr}"), server)
}

async fn next_event<T: Transport>(transport: &mut T) -> Option<TransportEvent> {
    timeout(Duration::from_secs(5), transport.next_event())
        .await
        .expect("transport event within 5s")
}

#[tokio::test]
async fn ping_is_answered_and_binary_arrives_as_text() {
    let (pong_tx, pong_rx) = oneshot::channel();
    let (url, server) = serve_once(|mut ws| async move {
        ws.send(Message::Ping(vec![1, 2, 3])).await.unwrap();
        ws.send(Message::Binary(br#"{"type":"connected"}"#.to_vec()))
            .await
            .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Pong(payload) = message {
                let _ = pong_tx.send(payload);
                break;
            }
        }
    })
    .await;

    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    assert_eq!(
        next_event(&mut transport).await,
        Some(TransportEvent::Text(r#"{"type":"connected"}"#.to_string()))
    );
    let pong = timeout(Duration::from_secs(5), pong_rx).await.unwrap().unwrap();
    assert_eq!(pong, vec![1, 2, 3]);

    server.await.unwrap();
}

#[tokio::test]
async fn text_frames_pass_both_ways() {
    let (received_tx, received_rx) = oneshot::channel();
    let (url, server) = serve_once(|mut ws| async move {
        if let Some(Ok(Message::Text(text))) = ws.next().await {
            let _ = received_tx.send(text);
        }
        ws.send(Message::Text("pong".into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let mut transport = WsConnector::new().connect(&url).await.unwrap();
    transport.send_text("ping".into()).await.unwrap();

    assert_eq!(
        timeout(Duration::from_secs(5), received_rx).await.unwrap().unwrap(),
        "ping"
    );
    assert_eq!(
        next_event(&mut transport).await,
        Some(TransportEvent::Text("pong".into()))
    );

    transport.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn bare_close_reports_no_status() {
    let (url, server) = serve_once(|mut ws| async move {
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    match next_event(&mut transport).await {
        Some(TransportEvent::Closed(close)) => {
            assert_eq!(close.code, CloseInfo::NO_STATUS);
            assert!(close.is_expected());
        }
        other => panic!("expected close, got {other:?}"),
    }

    drop(transport);
    server.await.unwrap();
}

#[tokio::test]
async fn close_code_and_reason_are_reported() {
    let (url, server) = serve_once(|mut ws| async move {
        ws.close(Some(CloseFrame {
            code: CloseCode::from(4000),
            reason: "maintenance".into(),
        }))
        .await
        .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let mut transport = WsConnector::new().connect(&url).await.unwrap();

    assert_eq!(
        next_event(&mut transport).await,
        Some(TransportEvent::Closed(CloseInfo::new(4000, "maintenance")))
    );
    assert!(!CloseInfo::new(4000, "maintenance").is_expected());

    drop(transport);
    server.await.unwrap();
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = WsConnector::new().connect(&format!("ws://{addr}")).await;

    assert!(result.is_err());
}
