//! Error types for wsline.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! Send operations return [`Result<()>`](Result) synchronously, while
//! transport failures reach the application through the event stream
//! (`EventKind::NetError` / `EventKind::Error`):
//!
//! ```ignore
//! use wsline::{Connection, Error};
//!
//! fn reply(conn: &Connection, text: &str) {
//!     match conn.send_text(text) {
//!         Ok(()) => {}
//!         Err(Error::BufferFull { .. }) => tracing::warn!("peer is slow, dropping"),
//!         Err(e) => tracing::debug!(error = %e, "send rejected"),
//!     }
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Dialing / accepting | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::Protocol`], [`Error::Url`] |
//! | Usage (returned by `send_*`) | [`Error::ClosedConnection`], [`Error::BufferFull`] |
//! | Runtime | [`Error::QueueClosed`], [`Error::BadMessageKind`] |
//! | Event access | [`Error::PayloadExpired`], [`Error::WrongEventKind`] |
//! | Network | [`Error::ReadTimeout`], [`Error::WriteTimeout`], [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::event::EventKind;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when a [`ConnectionConfig`](crate::ConnectionConfig) or
    /// server setup is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Dial / Accept Errors
    // ========================================================================
    /// Establishing the transport failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// The websocket handshake did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Handshake negotiated something we cannot work with.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Malformed URL passed to the dialer.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Send attempted on a connection that is closing or closed.
    #[error("Send on closed connection")]
    ClosedConnection,

    /// Send attempted while the outbound queue is at capacity.
    ///
    /// The frame is dropped; the connection stays open.
    #[error("Send buffer full ({capacity} frames)")]
    BufferFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// The write loop found the outbound queue closed with no producer left.
    #[error("Outbound queue closed")]
    QueueClosed,

    /// Inbound message was neither text nor binary.
    #[error("Bad message kind: {kind}")]
    BadMessageKind {
        /// Short description of what arrived.
        kind: String,
    },

    // ========================================================================
    // Event Access Errors
    // ========================================================================
    /// Event payload read after its handler call returned.
    #[error("Payload no longer readable: events may only be read during their handler call")]
    PayloadExpired,

    /// Typed payload accessor called on the wrong kind of event.
    #[error("{accessor}() called on {actual} event")]
    WrongEventKind {
        /// Accessor that was called.
        accessor: &'static str,
        /// Kind of the event it was called on.
        actual: EventKind,
    },

    // ========================================================================
    // Network Errors
    // ========================================================================
    /// No pong arrived before the read deadline.
    #[error("Read deadline exceeded: no pong within {timeout_ms}ms")]
    ReadTimeout {
        /// Read deadline window in milliseconds.
        timeout_ms: u64,
    },

    /// A write did not complete before the write deadline.
    #[error("Write deadline exceeded after {timeout_ms}ms")]
    WriteTimeout {
        /// Write deadline in milliseconds.
        timeout_ms: u64,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a buffer full error.
    #[inline]
    pub fn buffer_full(capacity: usize) -> Self {
        Self::BufferFull { capacity }
    }

    /// Creates a bad message kind error.
    #[inline]
    pub fn bad_message_kind(kind: impl Into<String>) -> Self {
        Self::BadMessageKind { kind: kind.into() }
    }

    /// Creates a wrong event kind error.
    #[inline]
    pub fn wrong_event_kind(accessor: &'static str, actual: EventKind) -> Self {
        Self::WrongEventKind { accessor, actual }
    }

    /// Creates a read timeout error.
    #[inline]
    pub fn read_timeout(timeout_ms: u64) -> Self {
        Self::ReadTimeout { timeout_ms }
    }

    /// Creates a write timeout error.
    #[inline]
    pub fn write_timeout(timeout_ms: u64) -> Self {
        Self::WriteTimeout { timeout_ms }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ReadTimeout { .. } | Self::WriteTimeout { .. }
        )
    }

    /// Returns `true` for transport-level failures.
    ///
    /// These are surfaced as `NetError` events when they end a connection.
    #[inline]
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::ReadTimeout { .. } | Self::WriteTimeout { .. } | Self::Io(_) | Self::WebSocket(_)
        )
    }

    /// Returns `true` for errors returned synchronously by `send_*`.
    ///
    /// Usage errors never disconnect the connection.
    #[inline]
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::ClosedConnection | Self::BufferFull { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
