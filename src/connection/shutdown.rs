//! Exactly-once disconnect.
//!
//! Any number of triggers (application `close`, read failure, write failure,
//! read deadline) may race here. The `Open → Closing` compare-and-swap picks
//! a single winner; only the winner's cause is reported.
//!
//! The winner does not dispatch anything itself. It parks the detached
//! handler and the cause, then cancels the loops; the read loop delivers the
//! terminal events once the transport is closed. A handler that calls
//! `close` from inside its own event therefore never re-enters itself.

use std::sync::atomic::Ordering;

use tracing::{debug, trace};

use crate::error::Error;
use crate::event::{EventHandler, EventKind, dispatch};

use super::{Connection, ConnectionState};

/// What the read loop needs to finish a connection.
pub(super) struct Terminal {
    handler: Option<EventHandler>,
    cause: Option<Error>,
}

impl Connection {
    /// Starts the shutdown. Only the first call has an effect.
    pub(crate) fn disconnect(&self, cause: Option<Error>) {
        let shared = &self.shared;
        let won = shared
            .state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if !won {
            if let Some(e) = &cause {
                trace!(connection_id = %shared.id, error = %e, "Disconnect already in progress");
            }
            return;
        }

        match &cause {
            Some(e) => debug!(connection_id = %shared.id, error = %e, "Disconnecting"),
            None => debug!(connection_id = %shared.id, "Disconnecting"),
        }

        let handler = shared.handler.lock().take();
        *shared.terminal.lock() = Some(Terminal { handler, cause });

        // Must come after parking the terminal: the read loop takes it as soon
        // as it observes the cancellation.
        shared.shutdown.cancel();
    }

    /// Delivers the terminal events. Runs once, on the read loop, after both
    /// loops have stopped.
    pub(super) fn finish(&self) {
        let shared = &self.shared;
        shared
            .state
            .store(ConnectionState::Closed as u8, Ordering::Release);

        let terminal = shared.terminal.lock().take();
        if let Some(Terminal {
            handler: Some(handler),
            cause,
        }) = terminal
        {
            if let Some(error) = cause {
                let kind = if error.is_network() {
                    EventKind::NetError
                } else {
                    EventKind::Error
                };
                dispatch(&handler, kind, self, None, Some(error));
            }
            dispatch(&handler, EventKind::Disconnected, self, None, None);
        }

        shared.finished.cancel();
        debug!(connection_id = %shared.id, "Connection closed");
    }
}
