//! Bounded outbound queue.
//!
//! Many producers (`send_*` callers), one consumer (the write loop).
//! Producers never block: a full queue rejects the frame.

// ============================================================================
// Imports
// ============================================================================

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::tungstenite::Message;

use crate::error::{Error, Result};

// ============================================================================
// OutboundFrame
// ============================================================================

/// Kind of an application frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Binary frame.
    Binary,
}

/// A frame accepted for transmission. Immutable once queued.
///
/// Only text and binary messages are ever wrapped; control frames belong to
/// the write loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame(Message);

impl OutboundFrame {
    /// Creates a text frame.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self(Message::text(text.into()))
    }

    /// Creates a binary frame.
    #[inline]
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self(Message::Binary(data.into()))
    }

    /// Returns the frame kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FrameKind {
        if self.0.is_text() {
            FrameKind::Text
        } else {
            FrameKind::Binary
        }
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Converts into a transport message.
    #[inline]
    pub(crate) fn into_message(self) -> Message {
        self.0
    }
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// Consumer side of the queue, owned by the write loop.
pub(crate) type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

/// Producer side of the bounded queue.
#[derive(Debug, Clone)]
pub(crate) struct OutboundQueue {
    tx: mpsc::Sender<OutboundFrame>,
}

impl OutboundQueue {
    /// Creates a queue holding at most `capacity` frames.
    ///
    /// `capacity` must be non-zero; [`ConnectionConfig::validate`](crate::ConnectionConfig::validate)
    /// guarantees it for configured connections.
    pub(crate) fn bounded(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::BufferFull`] if the queue is at capacity
    /// - [`Error::ClosedConnection`] if the write loop is gone
    pub(crate) fn offer(&self, frame: OutboundFrame) -> Result<()> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::buffer_full(self.capacity()),
            TrySendError::Closed(_) => Error::ClosedConnection,
        })
    }

    /// Configured capacity.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Frames currently waiting.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

// ============================================================================
// Tests
// ============================================================================
