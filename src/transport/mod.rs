//! Websocket transport layer.
//!
//! The connection runtime does not care where its transport came from; it
//! only needs a message stream it can split into a reader and a writer. This
//! module defines that contract and provides the two usual ways to obtain
//! one over TCP.
//!
//! # Connection Lifecycle
//!
//! 1. `Server::builder().bind(..).build()` - Bind and start accepting, or
//!    `connect(url, ..)` - dial a server
//! 2. Websocket handshake (path check, subprotocol negotiation)
//! 3. `Connection::new` - runtime starts, handler receives `Connected`
//! 4. Events flow until either side closes, then `Disconnected`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Outbound dial |
//! | `server` | Listener, upgrade and connection registry |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound dial.
pub mod client;

/// Websocket server.
pub mod server;

// ============================================================================
// Imports
// ============================================================================

use futures_util::{Sink, Stream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

// ============================================================================
// Re-exports
// ============================================================================

pub use client::connect;
pub use server::{Server, ServerBuilder};

// ============================================================================
// Transport
// ============================================================================

/// An established, message-oriented, full-duplex websocket transport.
///
/// Implemented for every `WebSocketStream`, whatever the underlying socket,
/// and for any other type with the same shape (in-memory transports in
/// tests, for instance).
///
/// Expected behavior of the transport itself:
/// - yields `Ping`/`Pong`/`Close` as well as data messages, and answers
///   pings without help
/// - enforces its own maximum inbound message size
/// - sends a close frame when the sink is closed
pub trait Transport:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Send
        + Unpin
        + 'static
{
}
