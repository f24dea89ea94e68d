//! wsline - Per-connection websocket runtime.
//!
//! This library turns an established websocket into a small event-driven
//! connection: the application supplies one handler function, receives a
//! serialized stream of events, and sends through a bounded non-blocking
//! queue. Liveness is kept by a ping/pong heartbeat, and every connection
//! ends exactly once.
//!
//! # Architecture
//!
//! Each [`Connection`] runs two tasks over its transport:
//!
//! - **Read loop**: reads frames, enforces the pong deadline, and is the
//!   only task that calls the handler
//! - **Write loop**: the only writer; drains the send queue and pings on a
//!   fixed period
//!
//! Key design principles:
//!
//! - Events for one connection are delivered one at a time, in order:
//!   `Connected`, messages and errors, then exactly one `Disconnected`
//! - Sending never blocks: a full queue rejects the frame
//! - Close, read failure, write failure and read timeout all end the
//!   connection through a single compare-and-swap
//!
//! # Quick Start
//!
//! ```no_run
//! use wsline::{Connection, Event, EventKind, Result, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::builder()
//!         .path("/echo")
//!         .handler(|event: &Event, conn: &Connection| {
//!             if event.kind() == EventKind::TextMessage
//!                 && let Ok(text) = event.text()
//!             {
//!                 let _ = conn.send_text(text);
//!             }
//!         })
//!         .build()
//!         .await?;
//!
//!     println!("Echoing on {}", server.ws_url());
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Connection runtime options |
//! | [`connection`] | [`Connection`] runtime: queue, loops, shutdown |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event`] | [`Event`] types and the handler contract |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`transport`] | [`Transport`] contract, [`Server`] and [`connect`] |

// ============================================================================
// Modules
// ============================================================================

/// Connection runtime options.
pub mod config;

/// Per-connection runtime.
///
/// - [`Connection`] - Handle to a running connection
/// - [`ConnectionInfo`] - Peer address and handshake metadata
/// - [`OutboundFrame`] - A frame accepted for transmission
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Connection events and the handler contract.
pub mod event;

/// Type-safe identifiers.
pub mod identifiers;

/// Websocket transport layer.
///
/// Server, client and the transport contract the runtime consumes.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::ConnectionConfig;

// Connection types
pub use connection::{Connection, ConnectionInfo, ConnectionState, FrameKind, OutboundFrame};

// Error types
pub use error::{Error, Result};

// Event types
pub use event::{Event, EventHandler, EventKind};

// Identifier types
pub use identifiers::ConnectionId;

// Transport types
pub use transport::{Server, ServerBuilder, Transport, connect};
