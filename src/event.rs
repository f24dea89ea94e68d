//! Connection events and the dispatcher that delivers them.
//!
//! Every connection reports its life through a single handler function,
//! called once per event:
//!
//! | Kind | Payload | Error | When |
//! |------|---------|-------|------|
//! | `Connected` | - | - | first event of every connection |
//! | `TextMessage` | yes | - | text frame received |
//! | `BinaryMessage` | yes | - | binary frame received |
//! | `Error` | - | yes | unexpected inbound kind, or non-network shutdown cause |
//! | `NetError` | - | yes | transport failure that ended the connection |
//! | `Disconnected` | - | - | last event of every connection |
//!
//! # Payload Lifetime
//!
//! The handler runs on the connection's read loop, and the next frame is not
//! read until it returns. A message payload is only readable during that
//! call: afterwards every read fails with [`Error::PayloadExpired`], even on
//! clones of the event that escaped the handler.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Event handler callback type.
///
/// Called serially for each event of a connection; different connections
/// may call it concurrently. The handler may call
/// [`Connection::send_text`], [`Connection::send_binary`] and
/// [`Connection::close`] from inside the call.
pub type EventHandler = Arc<dyn Fn(&Event, &Connection) + Send + Sync>;

/// Shared, expirable read position over a message payload.
type PayloadSlot = Arc<Mutex<Option<Cursor<Bytes>>>>;

// ============================================================================
// EventKind
// ============================================================================

/// Kind of a connection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The connection is up. Always the first event.
    Connected,
    /// A text message arrived; read it with [`Event::text`].
    TextMessage,
    /// A binary message arrived; read it with [`Event::data`].
    BinaryMessage,
    /// Something unforeseen happened.
    Error,
    /// A network error ended the connection. Always followed by `Disconnected`.
    NetError,
    /// The connection is gone. Always the last event.
    Disconnected,
}

impl EventKind {
    /// Returns `true` for kinds that carry a message payload.
    #[inline]
    #[must_use]
    pub const fn has_payload(self) -> bool {
        matches!(self, Self::TextMessage | Self::BinaryMessage)
    }

    /// Returns `true` for kinds that carry an error.
    #[inline]
    #[must_use]
    pub const fn has_error(self) -> bool {
        matches!(self, Self::Error | Self::NetError)
    }

    /// Debug name of the kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connected => "<EventConnected>",
            Self::TextMessage => "<EventTextMessage>",
            Self::BinaryMessage => "<EventBinaryMessage>",
            Self::Error => "<EventError>",
            Self::NetError => "<EventNetError>",
            Self::Disconnected => "<EventDisconnected>",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Event
// ============================================================================

/// A single connection event, valid for the duration of one handler call.
///
/// Also implements [`std::io::Read`], so message payloads can be streamed
/// into a decoder without an intermediate copy.
#[derive(Clone)]
pub struct Event {
    kind: EventKind,
    error: Option<Arc<Error>>,
    payload: Option<PayloadSlot>,
}

impl Event {
    /// Builds an event, enforcing the shape rules of its kind.
    ///
    /// # Panics
    ///
    /// Panics when the payload or error presence does not match `kind`.
    /// That can only be caused by a bug in the runtime itself.
    fn new(kind: EventKind, payload: Option<Bytes>, error: Option<Error>) -> Self {
        assert_eq!(
            kind.has_error(),
            error.is_some(),
            "{kind} event: error presence violates the event contract"
        );
        assert_eq!(
            kind.has_payload(),
            payload.is_some(),
            "{kind} event: payload presence violates the event contract"
        );

        Self {
            kind,
            error: error.map(Arc::new),
            payload: payload.map(|bytes| Arc::new(Mutex::new(Some(Cursor::new(bytes))))),
        }
    }

    /// Returns the event kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the error of an `Error` or `NetError` event.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_deref()
    }

    /// Reads the rest of a text message.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongEventKind`] if this is not a `TextMessage` event
    /// - [`Error::PayloadExpired`] if the handler call already returned
    /// - [`Error::Io`] if the remaining bytes are not valid UTF-8
    pub fn text(&self) -> Result<String> {
        if self.kind != EventKind::TextMessage {
            return Err(Error::wrong_event_kind("text", self.kind));
        }
        let bytes = self.take_remaining()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }

    /// Reads the rest of a binary message.
    ///
    /// # Errors
    ///
    /// - [`Error::WrongEventKind`] if this is not a `BinaryMessage` event
    /// - [`Error::PayloadExpired`] if the handler call already returned
    pub fn data(&self) -> Result<Bytes> {
        if self.kind != EventKind::BinaryMessage {
            return Err(Error::wrong_event_kind("data", self.kind));
        }
        self.take_remaining()
    }

    /// Reads up to `buf.len()` payload bytes, advancing the read position.
    ///
    /// Returns `Ok(0)` at the end of the payload, and always for events
    /// without a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PayloadExpired`] if the handler call already returned.
    pub fn read_payload(&self, buf: &mut [u8]) -> Result<usize> {
        let Some(slot) = &self.payload else {
            return Ok(0);
        };
        let mut guard = slot.lock();
        let cursor = guard.as_mut().ok_or(Error::PayloadExpired)?;
        Ok(cursor.read(buf)?)
    }

    /// Takes every unread payload byte without copying.
    fn take_remaining(&self) -> Result<Bytes> {
        let Some(slot) = &self.payload else {
            return Ok(Bytes::new());
        };
        let mut guard = slot.lock();
        let cursor = guard.as_mut().ok_or(Error::PayloadExpired)?;
        let bytes = cursor.get_ref();
        let start = usize::try_from(cursor.position())
            .unwrap_or(bytes.len())
            .min(bytes.len());
        let rest = bytes.slice(start..);
        cursor.set_position(bytes.len() as u64);
        Ok(rest)
    }

    /// Invalidates the payload for this event and all of its clones.
    fn expire(&self) {
        if let Some(slot) = &self.payload {
            slot.lock().take();
        }
    }
}

impl Read for Event {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_payload(buf).map_err(|e| match e {
            Error::Io(inner) => inner,
            other => io::Error::other(other),
        })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.error) {
            (EventKind::Error | EventKind::NetError, Some(e)) => {
                write!(f, "{{Event {} {e}}}", self.kind)
            }
            _ => write!(f, "{{Event {}}}", self.kind),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("error", &self.error)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Delivers one event to `handler` synchronously, then expires its payload.
///
/// # Panics
///
/// Panics if the arguments violate the shape rules of `kind`.
pub(crate) fn dispatch(
    handler: &EventHandler,
    kind: EventKind,
    connection: &Connection,
    payload: Option<Bytes>,
    error: Option<Error>,
) {
    let event = Event::new(kind, payload, error);
    handler(&event, connection);
    event.expire();
}

// ============================================================================
// Tests
// ============================================================================
