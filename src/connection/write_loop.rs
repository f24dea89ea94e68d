//! Write loop: drains the outbound queue and keeps the heartbeat going.
//!
//! The loop is the transport's only writer. It exits on shutdown or on the
//! first failed write, and closes the transport on the way out unless the
//! failure was a write timeout, in which case the transport is dropped.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{Connection, OutboundReceiver};

// ============================================================================
// Loop
// ============================================================================

/// Runs until shutdown or the first write failure.
pub(super) async fn run<W>(mut sink: W, connection: Connection, mut outbound: OutboundReceiver)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let id = connection.id();
    let write_wait = connection.config().write_wait;
    let period = connection.config().ping_period();
    let shutdown = connection.shared.shutdown.clone();

    // First ping immediately, so a dead peer is detected one pong window in.
    let mut failure = write(&mut sink, Message::Ping(Bytes::new()), write_wait)
        .await
        .err();

    if failure.is_none() {
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        failure = loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => break None,

                // The connection owns the sender, so the queue never closes
                // while this loop runs.
                Some(frame) = outbound.recv() => {
                    trace!(connection_id = %id, kind = ?frame.kind(), len = frame.len(), "Writing frame");
                    if let Err(e) = write(&mut sink, frame.into_message(), write_wait).await {
                        break Some(e);
                    }
                }

                _ = heartbeat.tick() => {
                    trace!(connection_id = %id, "Heartbeat ping");
                    if let Err(e) = write(&mut sink, Message::Ping(Bytes::new()), write_wait).await {
                        break Some(e);
                    }
                }
            }
        };
    }

    let stalled = matches!(failure, Some(Error::WriteTimeout { .. }));
    if let Some(e) = failure {
        debug!(connection_id = %id, error = %e, "Write failed");
        connection.disconnect(Some(e));
    }

    // Anything still queued is dropped; late senders see a closed queue.
    outbound.close();

    // A stalled peer will not take a close frame either.
    if stalled {
        debug!(connection_id = %id, "Skipping close handshake on stalled transport");
        return;
    }

    match timeout(write_wait, sink.close()).await {
        Ok(Ok(())) => trace!(connection_id = %id, "Transport closed"),
        Ok(Err(e)) => trace!(connection_id = %id, error = %e, "Transport close failed"),
        Err(_) => debug!(connection_id = %id, "Transport close timed out"),
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Writes and flushes one message within `write_wait`.
async fn write<W>(sink: &mut W, message: Message, write_wait: Duration) -> Result<()>
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    match timeout(write_wait, sink.send(message)).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::write_timeout(
            u64::try_from(write_wait.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

// ============================================================================
// Tests
// ============================================================================
