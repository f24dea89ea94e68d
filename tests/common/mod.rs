//! Shared test fixtures: an in-memory scripted transport and an event
//! recorder.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, Stream};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use wsline::{Connection, Event, EventHandler, EventKind};

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// ScriptedTransport
// ============================================================================

type Incoming = Result<Message, WsError>;

#[derive(Default)]
struct Wire {
    /// Feeds the transport's stream; `None` once the remote ended it.
    incoming: Option<mpsc::UnboundedSender<Incoming>>,
    sent: Vec<Message>,
    gate_closed: bool,
    gate_waker: Option<Waker>,
    fail_writes: bool,
    auto_pong: bool,
    closes: usize,
}

/// Transport half handed to the connection under test.
pub struct ScriptedTransport {
    rx: mpsc::UnboundedReceiver<Incoming>,
    wire: Arc<Mutex<Wire>>,
}

/// Test-side control of a [`ScriptedTransport`].
#[derive(Clone)]
pub struct Remote {
    wire: Arc<Mutex<Wire>>,
}

/// Creates a connected transport/remote pair.
pub fn scripted() -> (ScriptedTransport, Remote) {
    let (tx, rx) = mpsc::unbounded_channel();
    let wire = Arc::new(Mutex::new(Wire {
        incoming: Some(tx),
        ..Wire::default()
    }));
    (
        ScriptedTransport {
            rx,
            wire: Arc::clone(&wire),
        },
        Remote { wire },
    )
}

impl Remote {
    /// Delivers a message to the connection.
    pub fn push(&self, message: Message) {
        if let Some(tx) = &self.wire.lock().incoming {
            let _ = tx.send(Ok(message));
        }
    }

    /// Delivers a read error to the connection.
    pub fn push_error(&self, error: WsError) {
        if let Some(tx) = &self.wire.lock().incoming {
            let _ = tx.send(Err(error));
        }
    }

    /// Ends the inbound stream.
    pub fn end(&self) {
        self.wire.lock().incoming = None;
    }

    /// Blocks writes and close until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.wire.lock().gate_closed = true;
    }

    /// Releases blocked writes.
    pub fn open_gate(&self) {
        let waker = {
            let mut wire = self.wire.lock();
            wire.gate_closed = false;
            wire.gate_waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Makes every following write fail.
    pub fn fail_writes(&self) {
        let waker = {
            let mut wire = self.wire.lock();
            wire.fail_writes = true;
            wire.gate_waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Answers every ping with a pong.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.wire.lock().auto_pong = enabled;
    }

    /// Everything written so far.
    pub fn sent(&self) -> Vec<Message> {
        self.wire.lock().sent.clone()
    }

    /// Text and binary messages written so far.
    pub fn data_sent(&self) -> Vec<Message> {
        self.wire
            .lock()
            .sent
            .iter()
            .filter(|m| m.is_text() || m.is_binary())
            .cloned()
            .collect()
    }

    /// Number of pings written so far.
    pub fn pings(&self) -> usize {
        self.wire
            .lock()
            .sent
            .iter()
            .filter(|m| matches!(m, Message::Ping(_)))
            .count()
    }

    /// Number of times the transport was closed.
    pub fn closes(&self) -> usize {
        self.wire.lock().closes
    }
}

impl Stream for ScriptedTransport {
    type Item = Incoming;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Incoming>> {
        self.rx.poll_recv(cx)
    }
}

impl Sink<Message> for ScriptedTransport {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        let mut wire = self.wire.lock();
        if wire.fail_writes {
            return Poll::Ready(Err(WsError::Io(io::Error::from(io::ErrorKind::BrokenPipe))));
        }
        if wire.gate_closed {
            wire.gate_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        let mut wire = self.wire.lock();
        if wire.auto_pong
            && let Message::Ping(payload) = &item
            && let Some(tx) = &wire.incoming
        {
            let _ = tx.send(Ok(Message::Pong(payload.clone())));
        }
        wire.sent.push(item);
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        let mut wire = self.wire.lock();
        if wire.gate_closed {
            wire.gate_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        wire.closes += 1;
        Poll::Ready(Ok(()))
    }
}

// ============================================================================
// Recorder
// ============================================================================

/// What a handler saw, copied out while the payload was still readable.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub kind: EventKind,
    pub payload: Option<Bytes>,
    pub error: Option<String>,
}

impl Recorded {
    pub fn text(&self) -> Option<&str> {
        self.payload
            .as_ref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Receiving end of a recording handler.
pub struct Recorder {
    rx: mpsc::UnboundedReceiver<Recorded>,
}

/// Creates a handler that forwards a copy of every event.
pub fn recorder() -> (EventHandler, Recorder) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |event: &Event, _conn: &Connection| {
        let _ = tx.send(record(event));
    });
    (handler, Recorder { rx })
}

/// Copies an event while its payload is readable.
pub fn record(event: &Event) -> Recorded {
    let payload = match event.kind() {
        EventKind::TextMessage => event.text().ok().map(Bytes::from),
        EventKind::BinaryMessage => event.data().ok(),
        _ => None,
    };
    Recorded {
        kind: event.kind(),
        payload,
        error: event.error().map(ToString::to_string),
    }
}

impl Recorder {
    /// Waits for the next event.
    ///
    /// # Panics
    ///
    /// Panics if none arrives within `within` or the handler is gone.
    pub async fn next_within(&mut self, within: Duration) -> Recorded {
        tokio::time::timeout(within, self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("handler dropped")
    }

    /// Waits for the next event.
    ///
    /// The bound is wide enough for paused-clock tests that wait out a
    /// whole read deadline.
    pub async fn next(&mut self) -> Recorded {
        self.next_within(Duration::from_secs(60)).await
    }

    /// Waits for an event of `kind`, returning everything seen before it.
    pub async fn until(&mut self, kind: EventKind) -> Vec<Recorded> {
        let mut seen = Vec::new();
        loop {
            let event = self.next().await;
            let done = event.kind == kind;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    /// Returns the events delivered so far without waiting.
    pub fn drain(&mut self) -> Vec<Recorded> {
        let mut seen = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            seen.push(event);
        }
        seen
    }
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics if it does not hold within five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
