//! Per-connection runtime.
//!
//! A [`Connection`] owns one established transport and turns it into a
//! serialized event stream for the application.
//!
//! # Tasks
//!
//! ```text
//!                ┌──────────── Connection ────────────┐
//!   send_text ──►│ OutboundQueue ──► write loop ──────┼──► transport (sink)
//!   send_binary  │   (bounded)      + heartbeat ping  │
//!                │                                     │
//!   handler  ◄───┼── dispatch ◄──── read loop ◄───────┼─── transport (stream)
//!                │                  + pong deadline   │
//!   close ──────►│ disconnect (once) ─► cancel both   │
//!                └─────────────────────────────────────┘
//! ```
//!
//! - The write loop is the only writer, heartbeat pings included.
//! - The read loop is the only reader and the only dispatcher: it delivers
//!   `Connected` first and the terminal events last.
//! - [`Connection::close`], read failures and write failures all funnel into
//!   one compare-and-swap guarded shutdown.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `info` | Peer address and handshake metadata |
//! | `queue` | Bounded outbound queue |
//! | `read_loop` | Inbound frames → events, pong deadline |
//! | `write_loop` | Queue drain, heartbeat, transport close |
//! | `shutdown` | Exactly-once disconnect and terminal events |

// ============================================================================
// Submodules
// ============================================================================

mod info;
mod queue;
mod read_loop;
mod shutdown;
mod write_loop;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::Bytes;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::event::EventHandler;
use crate::identifiers::ConnectionId;
use crate::transport::Transport;

use self::shutdown::Terminal;

// ============================================================================
// Re-exports
// ============================================================================

pub use info::ConnectionInfo;
pub use queue::{FrameKind, OutboundFrame};

pub(crate) use queue::{OutboundQueue, OutboundReceiver};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// Sending and receiving.
    Open = 0,
    /// Shutdown started; sends are rejected.
    Closing = 1,
    /// Transport closed and terminal events delivered or being delivered.
    Closed = 2,
}

impl ConnectionState {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// State shared between the application handle and the two loops.
struct Shared {
    id: ConnectionId,
    info: ConnectionInfo,
    config: ConnectionConfig,
    state: AtomicU8,
    queue: OutboundQueue,
    /// Attached application handler; taken by the disconnect.
    handler: Mutex<Option<EventHandler>>,
    /// Handler and cause parked by the disconnect for the read loop.
    terminal: Mutex<Option<Terminal>>,
    /// Cancelled by the disconnect; stops both loops.
    shutdown: CancellationToken,
    /// Cancelled after `Disconnected` was delivered.
    finished: CancellationToken,
}

/// Handle to one running connection.
///
/// Cheap to clone; all clones refer to the same connection. The handle stays
/// valid after the connection ends, but every send then fails with
/// [`Error::ClosedConnection`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use wsline::{Connection, ConnectionConfig, ConnectionInfo, Event, EventKind};
///
/// let conn = Connection::new(ws_stream, ConnectionInfo::new(), ConnectionConfig::new(),
///     Arc::new(|event: &Event, conn: &Connection| {
///         if event.kind() == EventKind::TextMessage {
///             if let Ok(text) = event.text() {
///                 let _ = conn.send_text(text);
///             }
///         }
///     }))?;
/// ```
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

// ============================================================================
// Connection - Constructor
// ============================================================================

impl Connection {
    /// Starts the runtime on an established transport.
    ///
    /// Spawns the read loop and the write loop on the current tokio runtime.
    /// The first event delivered to `handler` is always `Connected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn new<T: Transport>(
        transport: T,
        info: ConnectionInfo,
        config: ConnectionConfig,
        handler: EventHandler,
    ) -> Result<Self> {
        config.validate()?;

        let (queue, outbound) = OutboundQueue::bounded(config.max_send_buffer_len);
        let connection = Self::from_parts(info, config, queue, Some(Arc::clone(&handler)));

        debug!(
            connection_id = %connection.id(),
            remote = %connection.remote_address(),
            "Connection runtime starting"
        );

        let (sink, stream) = transport.split();
        let writer = tokio::spawn(write_loop::run(sink, connection.clone(), outbound));
        tokio::spawn(read_loop::run(stream, connection.clone(), handler, writer));

        Ok(connection)
    }

    fn from_parts(
        info: ConnectionInfo,
        config: ConnectionConfig,
        queue: OutboundQueue,
        handler: Option<EventHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: ConnectionId::new(),
                info,
                config,
                state: AtomicU8::new(ConnectionState::Open as u8),
                queue,
                handler: Mutex::new(handler),
                terminal: Mutex::new(None),
                shutdown: CancellationToken::new(),
                finished: CancellationToken::new(),
            }),
        }
    }

    /// An open connection with no loops and no handler.
    #[cfg(test)]
    pub(crate) fn inert_for_tests() -> Self {
        let (queue, _outbound) = OutboundQueue::bounded(1);
        Self::from_parts(ConnectionInfo::new(), ConnectionConfig::new(), queue, None)
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Sends a text message.
    ///
    /// Success only means the frame was queued; transmission failures show
    /// up later as `NetError` + `Disconnected` events.
    ///
    /// # Errors
    ///
    /// - [`Error::ClosedConnection`] if the connection is closing or closed
    /// - [`Error::BufferFull`] if the send queue is full (the frame is dropped)
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.enqueue(OutboundFrame::text(text))
    }

    /// Sends a binary message.
    ///
    /// # Errors
    ///
    /// - [`Error::ClosedConnection`] if the connection is closing or closed
    /// - [`Error::BufferFull`] if the send queue is full (the frame is dropped)
    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.enqueue(OutboundFrame::binary(data))
    }

    /// Closes the connection.
    ///
    /// Once this returns no further frames are sent. The handler still
    /// receives the `Disconnected` event. Calling it again, or after the
    /// connection ended on its own, does nothing.
    pub fn close(&self) {
        self.disconnect(None);
    }

    /// Waits until the `Disconnected` event has been delivered.
    pub async fn closed(&self) {
        self.shared.finished.cancelled().await;
    }

    /// Returns the connection ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Returns `true` while the connection accepts sends.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Returns the peer address, if known.
    #[inline]
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.shared.info.remote_addr()
    }

    /// Returns the peer address as a string, or `"unknown"`.
    #[must_use]
    pub fn remote_address(&self) -> String {
        self.remote_addr()
            .map_or_else(|| "unknown".to_string(), |addr| addr.to_string())
    }

    /// Returns the handshake metadata.
    #[inline]
    #[must_use]
    pub fn info(&self) -> &ConnectionInfo {
        &self.shared.info
    }

    /// Returns the runtime configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    /// Returns the number of frames waiting in the send queue.
    #[inline]
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<()> {
        if !self.is_open() {
            return Err(Error::ClosedConnection);
        }
        self.shared.queue.offer(frame)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{Connection {}/{}}}",
            self.shared.info.uri().unwrap_or_default(),
            self.remote_address()
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("remote_addr", &self.remote_addr())
            .field("state", &self.state())
            .field("queued", &self.queued())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
