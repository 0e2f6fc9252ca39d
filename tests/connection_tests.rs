use std::time::Duration;

use serde_json::json;
use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};

use tradelink::error::{ConnectionError, Error};
use tradelink::runtime::connection::{ConnectionState, ResilientConnection};
use tradelink::testkit::config::{connection, doubling_to_5s, reconnection};
use tradelink::testkit::eventually;
use tradelink::testkit::handler::RecordingHandler;
use tradelink::testkit::transport::{ConnectOutcome, ScriptedConnector};

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[tokio::test(start_paused = true)]
async fn first_attempt_is_immediate() {
    let (connector, probe) = ScriptedConnector::refusing();
    let _connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    assert!(eventually(|| probe.attempt_count() == 1).await);
    sleep(ms(999)).await;
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn refused_attempts_follow_capped_backoff() {
    let (connector, probe) = ScriptedConnector::refusing();
    let _connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    // Attempts at 0, 1s, 3s, 7s, 12s, 17s, 22s.
    sleep(ms(22_500)).await;

    assert_eq!(
        probe.attempt_gaps(),
        vec![ms(1000), ms(2000), ms(4000), ms(5000), ms(5000), ms(5000)]
    );
}

#[tokio::test(start_paused = true)]
async fn four_failures_schedule_doubling_delays_up_to_cap() {
    let (connector, probe) = ScriptedConnector::refusing();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    sleep(ms(12_500)).await;

    assert_eq!(probe.attempt_count(), 5);
    assert_eq!(
        probe.attempt_gaps(),
        vec![ms(1000), ms(2000), ms(4000), ms(5000)]
    );
    assert_eq!(
        connection.state(),
        ConnectionState::Closed { retry_in: ms(5000) }
    );
}

#[tokio::test(start_paused = true)]
async fn default_schedule_grows_by_half() {
    let (connector, probe) = ScriptedConnector::refusing();
    let _connection = ResilientConnection::spawn(
        connection(reconnection(1000, 60_000, 1.5)),
        connector,
        RecordingHandler::new(),
    )
    .unwrap();

    // Attempts at 0, 1s, 2.5s, 4.75s.
    sleep(ms(5_000)).await;

    assert_eq!(probe.attempt_gaps(), vec![ms(1000), ms(1500), ms(2250)]);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_backoff() {
    let refused = || ConnectOutcome::Refuse("connection refused".into());
    let (connector, mut probe) = ScriptedConnector::scripted(
        vec![refused(), refused(), refused(), ConnectOutcome::Accept],
        ConnectOutcome::Accept,
    );
    let handler = RecordingHandler::new();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler.clone())
            .unwrap();

    // Opens on the fourth attempt, at 7s.
    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    first.close(1000);

    let _second = probe.next_link().await;

    let gaps = probe.attempt_gaps();
    assert_eq!(gaps, vec![ms(1000), ms(2000), ms(4000), ms(1000)]);
    assert!(eventually(|| handler.fresh_connect_count() == 2).await);
}

#[tokio::test(start_paused = true)]
async fn reopen_after_close_waits_initial_delay() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let handler = RecordingHandler::new();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler.clone())
            .unwrap();

    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    first.close(1001);
    assert!(
        eventually(|| connection.state() == ConnectionState::Closed { retry_in: ms(1000) }).await
    );

    let _second = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);

    assert_eq!(handler.fresh_connect_count(), 2);
    assert_eq!(probe.attempt_gaps(), vec![ms(1000)]);
}

#[tokio::test(start_paused = true)]
async fn fresh_connect_fires_once_per_open() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let handler = RecordingHandler::new();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler.clone())
            .unwrap();

    for expected in 1..=3 {
        let link = probe.next_link().await;
        assert!(eventually(|| connection.is_active()).await);
        assert_eq!(handler.fresh_connect_count(), expected);
        link.fail("connection reset by peer");
    }
}

#[tokio::test(start_paused = true)]
async fn teardown_cancels_pending_retry() {
    let (connector, probe) = ScriptedConnector::refusing();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    assert!(
        eventually(|| connection.state() == ConnectionState::Closed { retry_in: ms(1000) }).await
    );
    connection.teardown();

    sleep(ms(30_000)).await;

    assert_eq!(probe.attempt_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn teardown_closes_open_transport() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    let link = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);

    connection.shutdown().await;

    assert!(link.is_closed());
    sleep(ms(30_000)).await;
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn teardown_abandons_hanging_connect() {
    let (connector, probe) = ScriptedConnector::scripted(Vec::new(), ConnectOutcome::Hang);
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    assert!(eventually(|| probe.attempt_count() == 1).await);
    assert_eq!(connection.state(), ConnectionState::Connecting);

    connection.shutdown().await;

    sleep(ms(30_000)).await;
    assert_eq!(probe.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_fails_while_disconnected() {
    let (connector, _probe) = ScriptedConnector::refusing();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    assert!(eventually(|| matches!(connection.state(), ConnectionState::Closed { .. })).await);

    let result = connection.send(json!({"type": "ping"}));

    assert!(matches!(
        result,
        Err(Error::Connection(ConnectionError::NotConnected {
            state: ConnectionState::Closed { .. }
        }))
    ));
}

#[tokio::test(start_paused = true)]
async fn send_writes_to_open_transport() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    let link = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);

    assert_ok!(connection.send("raw frame"));
    assert_ok!(connection.send(json!({"type": "subscribe", "channel": "v4_markets"})));

    assert!(eventually(|| link.sent_frames().len() == 2).await);
    let frames = link.sent_frames();
    assert_eq!(frames[0], "raw frame");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&frames[1]).unwrap(),
        json!({"type": "subscribe", "channel": "v4_markets"})
    );
}

#[tokio::test(start_paused = true)]
async fn frames_are_not_replayed_on_next_transport() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    first.close(1000);
    assert!(eventually(|| !connection.is_active()).await);

    assert_err!(connection.send("lost"));

    let second = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    tokio::task::yield_now().await;

    assert!(second.sent_frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn greeting_is_sent_on_every_fresh_connect() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let handler = RecordingHandler::new().with_greeting(r#"{"type":"subscribe"}"#);
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler).unwrap();

    let first = probe.next_link().await;
    assert!(eventually(|| first.sent_frames().len() == 1).await);
    first.close(1006);

    let second = probe.next_link().await;
    assert!(eventually(|| second.sent_frames().len() == 1).await);
    assert!(connection.is_active());
}

#[tokio::test(start_paused = true)]
async fn malformed_message_is_dropped_without_reconnecting() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let handler = RecordingHandler::new();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler.clone())
            .unwrap();

    let link = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);

    link.push_text("{not json");
    link.push_json(&json!({"type": "channel_data", "contents": 1}));

    assert!(eventually(|| handler.messages().len() == 1).await);
    assert_eq!(
        handler.messages(),
        vec![json!({"type": "channel_data", "contents": 1})]
    );
    assert!(connection.is_active());
    assert_eq!(probe.attempt_count(), 1);
    assert_eq!(handler.fresh_connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_reconnects() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    first.close(1011);

    let _second = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    assert_eq!(probe.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn restart_replaces_open_transport_immediately() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let handler = RecordingHandler::new();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, handler.clone())
            .unwrap();

    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);

    connection.restart();
    let _second = probe.next_link().await;

    assert!(first.is_closed());
    assert_eq!(probe.attempt_gaps(), vec![Duration::ZERO]);
    assert!(eventually(|| handler.fresh_connect_count() == 2).await);
}

#[tokio::test(start_paused = true)]
async fn restart_skips_remaining_backoff() {
    let (connector, mut probe) = ScriptedConnector::scripted(
        vec![ConnectOutcome::Refuse("connection refused".into())],
        ConnectOutcome::Accept,
    );
    let connection = ResilientConnection::spawn(
        connection(reconnection(60_000, 60_000, 1.0)),
        connector,
        RecordingHandler::new(),
    )
    .unwrap();

    assert!(eventually(
        || connection.state() == ConnectionState::Closed { retry_in: ms(60_000) }
    )
    .await);

    connection.restart();
    let _link = probe.next_link().await;

    assert_eq!(probe.attempt_gaps(), vec![Duration::ZERO]);
}

#[tokio::test(start_paused = true)]
async fn restart_after_teardown_is_ignored() {
    let (connector, probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();

    assert!(eventually(|| connection.is_active()).await);
    connection.teardown();
    connection.restart();

    sleep(ms(10_000)).await;
    assert_eq!(probe.attempt_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn connection_id_counts_transports() {
    let (connector, mut probe) = ScriptedConnector::accepting();
    let connection =
        ResilientConnection::spawn(connection(doubling_to_5s()), connector, RecordingHandler::new())
            .unwrap();
    let handle = connection.handle();

    let first = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    assert_eq!(handle.connection_id(), Some(1));

    first.close(1000);
    assert!(eventually(|| matches!(connection.state(), ConnectionState::Closed { .. })).await);
    assert_eq!(handle.connection_id(), None);

    let _second = probe.next_link().await;
    assert!(eventually(|| connection.is_active()).await);
    assert_eq!(handle.connection_id(), Some(2));

    connection.teardown();
    assert!(connection.state().is_terminal());
    assert_eq!(handle.connection_id(), None);
}
