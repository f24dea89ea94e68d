//! Read loop: inbound frames to events, pong deadline, terminal dispatch.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::event::{EventHandler, EventKind, dispatch};

use super::Connection;

// ============================================================================
// Loop
// ============================================================================

/// Runs until the connection shuts down, then delivers the terminal events.
///
/// `handler` is only used for `Connected`: a `close` issued before this task
/// first runs has already detached the handler slot, but the connection must
/// still open with `Connected`.
pub(super) async fn run<S>(
    mut stream: S,
    connection: Connection,
    handler: EventHandler,
    writer: JoinHandle<()>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let _guard = StopOnDrop(&connection);
    let id = connection.id();

    dispatch(&handler, EventKind::Connected, &connection, None, None);
    drop(handler);

    let pong_wait = connection.config().pong_wait;
    let deadline = sleep(pong_wait);
    tokio::pin!(deadline);

    let shutdown = connection.shared.shutdown.clone();

    let cause = loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break None,

            () = &mut deadline => {
                debug!(connection_id = %id, "No pong before read deadline");
                break Some(Error::read_timeout(millis(pong_wait)));
            }

            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_attached(&connection, EventKind::TextMessage, Some(Bytes::from(text)), None);
                    }

                    Some(Ok(Message::Binary(data))) => {
                        dispatch_attached(&connection, EventKind::BinaryMessage, Some(data), None);
                    }

                    Some(Ok(Message::Pong(_))) => {
                        trace!(connection_id = %id, "Pong received");
                        deadline.as_mut().reset(Instant::now() + pong_wait);
                    }

                    // The transport answers pings on its own.
                    Some(Ok(Message::Ping(_))) => {}

                    Some(Ok(Message::Close(frame))) => {
                        debug!(connection_id = %id, ?frame, "Close frame received");
                        break None;
                    }

                    Some(Ok(Message::Frame(_))) => {
                        warn!(connection_id = %id, "Unexpected raw frame");
                        dispatch_attached(
                            &connection,
                            EventKind::Error,
                            None,
                            Some(Error::bad_message_kind("raw frame")),
                        );
                    }

                    Some(Err(e)) if is_clean_close(&e) => {
                        debug!(connection_id = %id, error = %e, "Peer went away");
                        break None;
                    }

                    Some(Err(e)) => {
                        debug!(connection_id = %id, error = %e, "Read failed");
                        break Some(Error::WebSocket(e));
                    }

                    None => {
                        debug!(connection_id = %id, "Stream ended");
                        break None;
                    }
                }
            }
        }
    };

    connection.disconnect(cause);
    // Whoever won the disconnect parks the terminal before cancelling.
    shutdown.cancelled().await;
    drop(stream);

    if let Err(e) = writer.await {
        warn!(connection_id = %id, error = %e, "Write loop did not finish cleanly");
    }

    connection.finish();
}

// ============================================================================
// Helpers
// ============================================================================

/// Dispatches to the attached handler, if the connection still has one.
///
/// The handler is cloned out of the slot so a `close` from inside the call
/// can take the slot without deadlocking.
fn dispatch_attached(
    connection: &Connection,
    kind: EventKind,
    payload: Option<Bytes>,
    error: Option<Error>,
) {
    let handler = connection.shared.handler.lock().clone();
    if let Some(handler) = handler {
        dispatch(&handler, kind, connection, payload, error);
    }
}

/// Read errors that mean the peer simply went away.
fn is_clean_close(error: &WsError) -> bool {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Stops the write loop and releases `closed()` waiters if the read loop
/// unwinds out of a handler.
struct StopOnDrop<'a>(&'a Connection);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.disconnect(None);
        self.0.shared.finished.cancel();
    }
}

// ============================================================================
// Tests
// ============================================================================
