//! Connection runtime configuration.
//!
//! Durations and limits shared by every connection a [`Server`](crate::Server)
//! accepts or [`connect`](crate::connect) dials.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wsline::ConnectionConfig;
//!
//! let config = ConnectionConfig::new()
//!     .with_pong_wait(Duration::from_secs(30))
//!     .with_max_send_buffer_len(64)
//!     .with_subprotocol("birect");
//!
//! assert_eq!(config.ping_period(), Duration::from_secs(21));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Time allowed to write a message to the peer.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time allowed to read the next pong message from the peer.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Outbound frames that may wait in the send queue.
pub const DEFAULT_MAX_SEND_BUFFER_LEN: usize = 256;

/// Maximum inbound message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 << 10;

/// Socket read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Socket write buffer size.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4096;

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Connection runtime options.
///
/// The heartbeat period is not configured directly: it is always
/// [`ping_period`](Self::ping_period), 70% of `pong_wait`, so that an idle
/// but healthy connection never trips the peer's read deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Deadline for each individual write.
    #[serde(with = "duration_ms")]
    pub write_wait: Duration,

    /// Read deadline window, extended by every received pong.
    #[serde(with = "duration_ms")]
    pub pong_wait: Duration,

    /// Capacity of the outbound queue, in frames.
    pub max_send_buffer_len: usize,

    /// Maximum inbound message size in bytes (`None` for unlimited).
    pub max_message_size: Option<usize>,

    /// Transport read buffer size in bytes.
    pub read_buffer_size: usize,

    /// Transport write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Upper bound on the websocket handshake (`None` waits forever).
    #[serde(with = "opt_duration_ms")]
    pub handshake_timeout: Option<Duration>,

    /// Subprotocols in order of preference.
    pub subprotocols: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            max_send_buffer_len: DEFAULT_MAX_SEND_BUFFER_LEN,
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            handshake_timeout: None,
            subprotocols: Vec::new(),
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Sets the per-write deadline.
    #[inline]
    #[must_use]
    pub fn with_write_wait(mut self, write_wait: Duration) -> Self {
        self.write_wait = write_wait;
        self
    }

    /// Sets the read deadline window.
    #[inline]
    #[must_use]
    pub fn with_pong_wait(mut self, pong_wait: Duration) -> Self {
        self.pong_wait = pong_wait;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_max_send_buffer_len(mut self, len: usize) -> Self {
        self.max_send_buffer_len = len;
        self
    }

    /// Sets the inbound message size limit.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: Option<usize>) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets transport buffer sizes.
    #[inline]
    #[must_use]
    pub fn with_buffer_sizes(mut self, read: usize, write: usize) -> Self {
        self.read_buffer_size = read;
        self.write_buffer_size = write;
        self
    }

    /// Bounds the websocket handshake.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Adds a subprotocol to the preference list.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }
}

// ============================================================================
// Derived Values
// ============================================================================

impl ConnectionConfig {
    /// Heartbeat period: 70% of `pong_wait`.
    #[inline]
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 7 / 10
    }

    /// Converts to the transport's own configuration.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::default()
            .read_buffer_size(self.read_buffer_size)
            .write_buffer_size(self.write_buffer_size)
            .max_message_size(self.max_message_size)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a duration or capacity is zero, or if the
    /// buffer sizes are unusable.
    pub fn validate(&self) -> Result<()> {
        if self.write_wait.is_zero() {
            return Err(Error::config("write_wait must be greater than zero"));
        }
        if self.ping_period().is_zero() {
            return Err(Error::config("pong_wait is too small to derive a ping period"));
        }
        if self.max_send_buffer_len == 0 {
            return Err(Error::config("max_send_buffer_len must be greater than zero"));
        }
        if self.read_buffer_size == 0 {
            return Err(Error::config("read_buffer_size must be greater than zero"));
        }
        if self.max_message_size == Some(0) {
            return Err(Error::config("max_message_size must be greater than zero"));
        }
        if self.subprotocols.iter().any(String::is_empty) {
            return Err(Error::config("subprotocol names must not be empty"));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Helpers
// ============================================================================

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => {
                serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

// ============================================================================
// Tests
// ============================================================================
