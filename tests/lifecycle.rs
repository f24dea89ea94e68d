//! Connection lifecycle over an in-memory transport.

mod common;

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{Data, OpCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use wsline::{
    Connection, ConnectionConfig, ConnectionInfo, ConnectionState, Error, Event, EventHandler,
    EventKind,
};

use common::{Remote, eventually, init_tracing, record, recorder, scripted};

fn start(handler: EventHandler, config: ConnectionConfig) -> (Connection, Remote) {
    init_tracing();
    let (transport, remote) = scripted();
    let info = ConnectionInfo::new().with_remote_addr("10.0.0.7:4242".parse().expect("addr"));
    let connection = Connection::new(transport, info, config, handler).expect("valid config");
    (connection, remote)
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_connected_first_disconnected_last() {
    let (handler, mut events) = recorder();
    let (conn, remote) = start(handler, ConnectionConfig::new());

    remote.push(Message::text("hello"));
    remote.push(Message::binary(vec![1u8, 2, 3]));

    assert_eq!(events.next().await.kind, EventKind::Connected);

    let text = events.next().await;
    assert_eq!(text.kind, EventKind::TextMessage);
    assert_eq!(text.text(), Some("hello"));

    let binary = events.next().await;
    assert_eq!(binary.kind, EventKind::BinaryMessage);
    assert_eq!(binary.payload.as_deref(), Some(&[1u8, 2, 3][..]));

    remote.end();

    let last = events.next().await;
    assert_eq!(last.kind, EventKind::Disconnected);
    assert!(last.error.is_none());

    conn.closed().await;
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(events.drain().is_empty());
    assert_eq!(remote.closes(), 1);
}

#[tokio::test]
async fn test_close_before_first_poll_still_connects() {
    let (handler, mut events) = recorder();
    let (conn, _remote) = start(handler, ConnectionConfig::new());
    conn.close();

    let seen = events.until(EventKind::Disconnected).await;
    let kinds: Vec<_> = seen.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Connected, EventKind::Disconnected]);
}

#[tokio::test]
async fn test_remote_address() {
    let (handler, _events) = recorder();
    let (conn, _remote) = start(handler, ConnectionConfig::new());
    assert_eq!(conn.remote_address(), "10.0.0.7:4242");
    conn.close();
    conn.closed().await;
}

// ============================================================================
// Sending
// ============================================================================

#[tokio::test]
async fn test_send_after_close_never_enqueues() {
    let (handler, mut events) = recorder();
    let (conn, remote) = start(handler, ConnectionConfig::new());
    events.next().await;

    conn.close();
    assert!(matches!(conn.send_text("late"), Err(Error::ClosedConnection)));
    assert!(matches!(
        conn.send_binary(Bytes::from_static(b"late")),
        Err(Error::ClosedConnection)
    ));

    events.until(EventKind::Disconnected).await;
    assert!(remote.data_sent().is_empty());
}

#[tokio::test]
async fn test_buffer_full_then_fifo() {
    let (transport, remote) = scripted();
    remote.close_gate();

    let (handler, mut events) = recorder();
    let conn = Connection::new(
        transport,
        ConnectionInfo::new(),
        ConnectionConfig::new().with_max_send_buffer_len(4),
        handler,
    )
    .expect("valid config");
    events.next().await;

    for i in 0..4 {
        conn.send_text(format!("m{i}")).expect("room in queue");
    }
    assert!(matches!(
        conn.send_text("overflow"),
        Err(Error::BufferFull { capacity: 4 })
    ));
    assert_eq!(conn.queued(), 4);
    assert!(conn.is_open());

    remote.open_gate();
    eventually(|| remote.data_sent().len() == 4).await;

    let expected: Vec<_> = (0..4).map(|i| Message::text(format!("m{i}"))).collect();
    assert_eq!(remote.data_sent(), expected);
    assert!(matches!(remote.sent().first(), Some(Message::Ping(_))));

    conn.close();
    conn.closed().await;
}

#[tokio::test]
async fn test_handler_can_reply_and_close() {
    init_tracing();
    let (transport, remote) = scripted();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |event: &Event, conn: &Connection| {
        if event.kind() == EventKind::TextMessage {
            let text = event.text().expect("readable");
            if text == "bye" {
                conn.close();
            } else {
                conn.send_text(format!("echo:{text}")).expect("queued");
            }
        }
        let _ = tx.send(event.kind());
    });
    let conn = Connection::new(transport, ConnectionInfo::new(), ConnectionConfig::new(), handler)
        .expect("valid config");

    remote.push(Message::text("one"));
    eventually(|| remote.data_sent() == vec![Message::text("echo:one")]).await;

    remote.push(Message::text("bye"));
    remote.push(Message::text("never delivered"));
    conn.closed().await;

    let mut kinds = Vec::new();
    while let Ok(kind) = rx.try_recv() {
        kinds.push(kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::Connected,
            EventKind::TextMessage,
            EventKind::TextMessage,
            EventKind::Disconnected,
        ]
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_read_error_is_net_error() {
    let (handler, mut events) = recorder();
    let (conn, remote) = start(handler, ConnectionConfig::new());

    remote.push_error(WsError::Io(io::Error::from(io::ErrorKind::ConnectionReset)));

    let seen = events.until(EventKind::Disconnected).await;
    let kinds: Vec<_> = seen.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Connected,
            EventKind::NetError,
            EventKind::Disconnected
        ]
    );
    assert!(seen[1].error.as_deref().is_some_and(|e| e.contains("WebSocket error")));

    conn.closed().await;
    assert_eq!(remote.closes(), 1);
}

#[tokio::test]
async fn test_peer_reset_is_clean() {
    let (handler, mut events) = recorder();
    let (_conn, remote) = start(handler, ConnectionConfig::new());

    remote.push_error(WsError::ConnectionClosed);

    let seen = events.until(EventKind::Disconnected).await;
    assert!(seen.iter().all(|e| e.error.is_none()));
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_close_frame_is_clean() {
    let (handler, mut events) = recorder();
    let (_conn, remote) = start(handler, ConnectionConfig::new());

    remote.push(Message::Close(None));

    let seen = events.until(EventKind::Disconnected).await;
    let kinds: Vec<_> = seen.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Connected, EventKind::Disconnected]);
}

#[tokio::test]
async fn test_write_error_is_net_error() {
    let (handler, mut events) = recorder();
    let (conn, remote) = start(handler, ConnectionConfig::new());
    events.next().await;

    remote.fail_writes();
    // Whether or not this one is accepted, the write loop hits the failure.
    let _ = conn.send_text("doomed");

    let seen = events.until(EventKind::Disconnected).await;
    assert_eq!(seen[0].kind, EventKind::NetError);
    assert_eq!(seen.len(), 2);
}

#[tokio::test]
async fn test_raw_frame_reports_error_and_keeps_reading() {
    let (handler, mut events) = recorder();
    let (conn, remote) = start(handler, ConnectionConfig::new());

    remote.push(Message::Frame(Frame::message(
        b"raw".to_vec(),
        OpCode::Data(Data::Binary),
        true,
    )));
    remote.push(Message::text("still here"));

    assert_eq!(events.next().await.kind, EventKind::Connected);
    let error = events.next().await;
    assert_eq!(error.kind, EventKind::Error);
    assert!(error.error.as_deref().is_some_and(|e| e.contains("Bad message kind")));

    let text = events.next().await;
    assert_eq!(text.text(), Some("still here"));
    assert!(conn.is_open());

    conn.close();
    conn.closed().await;
}

// ============================================================================
// Exactly Once
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_disconnect_once() {
    for _ in 0..20 {
        let (handler, mut events) = recorder();
        let (conn, remote) = start(handler, ConnectionConfig::new());

        let closers: Vec<_> = (0..4)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.close() })
            })
            .collect();
        let reader = {
            let remote = remote.clone();
            tokio::spawn(async move {
                remote.push_error(WsError::Io(io::Error::from(io::ErrorKind::ConnectionReset)));
            })
        };
        let writer = {
            let remote = remote.clone();
            tokio::spawn(async move { remote.fail_writes() })
        };

        for task in closers {
            task.await.expect("closer");
        }
        reader.await.expect("reader");
        writer.await.expect("writer");

        let seen = events.until(EventKind::Disconnected).await;
        conn.closed().await;

        assert_eq!(seen[0].kind, EventKind::Connected);
        assert!(seen.len() <= 3, "unexpected events: {seen:?}");
        assert!(events.drain().is_empty());
        assert_eq!(remote.closes(), 1);
    }
}

// ============================================================================
// Payload Lifetime
// ============================================================================

#[tokio::test]
async fn test_payload_expires_after_handler() {
    init_tracing();
    let (transport, remote) = scripted();
    let escaped: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let during: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let handler: EventHandler = {
        let escaped = Arc::clone(&escaped);
        let during = Arc::clone(&during);
        Arc::new(move |event: &Event, _conn: &Connection| {
            if event.kind() == EventKind::TextMessage {
                during.lock().push(record(event).text().unwrap_or_default().to_string());
                escaped.lock().push(event.clone());
            }
        })
    };
    let conn = Connection::new(transport, ConnectionInfo::new(), ConnectionConfig::new(), handler)
        .expect("valid config");

    remote.push(Message::text("short-lived"));
    eventually(|| !escaped.lock().is_empty()).await;

    assert_eq!(*during.lock(), vec!["short-lived".to_string()]);
    let event = escaped.lock().pop().expect("escaped event");
    assert!(matches!(event.text(), Err(Error::PayloadExpired)));

    conn.close();
    conn.closed().await;
}
