//! Echo server.
//!
//! Demonstrates:
//! - Building a `Server` with a path filter
//! - Echoing text and binary messages from the event handler
//! - Logging connection lifecycle events
//! - Graceful shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- 0.0.0.0:9001 --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;

use common::{Args, ECHO_PATH};
use tracing::{info, warn};
use wsline::{Connection, ConnectionConfig, Error, Event, EventKind, Result, Server};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let addr: SocketAddr = args
        .addr
        .parse()
        .map_err(|e| Error::config(format!("invalid address {}: {e}", args.addr)))?;

    let server = Server::builder()
        .bind(addr)
        .path(ECHO_PATH)
        .config(ConnectionConfig::new())
        .handler(on_event)
        .build()
        .await?;

    println!("Echo server listening on {}", server.ws_url());
    println!("Press Ctrl+C to exit...");

    tokio::signal::ctrl_c().await?;

    server.shutdown().await;
    println!("Bye");
    Ok(())
}

// ============================================================================
// Handler
// ============================================================================

fn on_event(event: &Event, conn: &Connection) {
    match event.kind() {
        EventKind::Connected => {
            info!(remote = %conn.remote_address(), id = %conn.id(), "Client connected");
        }
        EventKind::TextMessage => match event.text() {
            Ok(text) => {
                if let Err(e) = conn.send_text(text) {
                    warn!(error = %e, "Echo dropped");
                }
            }
            Err(e) => warn!(error = %e, "Unreadable text message"),
        },
        EventKind::BinaryMessage => match event.data() {
            Ok(data) => {
                if let Err(e) = conn.send_binary(data) {
                    warn!(error = %e, "Echo dropped");
                }
            }
            Err(e) => warn!(error = %e, "Unreadable binary message"),
        },
        EventKind::Error | EventKind::NetError => {
            warn!(remote = %conn.remote_address(), "{event}");
        }
        EventKind::Disconnected => {
            info!(remote = %conn.remote_address(), id = %conn.id(), "Client disconnected");
        }
    }
}
