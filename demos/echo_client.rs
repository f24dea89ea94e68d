//! Echo client.
//!
//! Demonstrates:
//! - Dialing a server with `connect`
//! - Sending lines read from stdin
//! - Printing echoed messages from the event handler
//! - Waiting for `Disconnected` with `Connection::closed`
//!
//! Usage:
//!   cargo run --example echo_server   (in another terminal)
//!   cargo run --example echo_client
//!   cargo run --example echo_client -- 127.0.0.1:9001 --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::{Args, ECHO_PATH};
use tokio::io::{AsyncBufReadExt, BufReader};
use wsline::{Connection, ConnectionConfig, Event, EventKind, Result, connect};

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
    let url = format!("ws://{}{ECHO_PATH}", args.addr);
    let conn = connect(&url, ConnectionConfig::new(), on_event).await?;

    println!("Connected to {url}; type lines to send, Ctrl+D to quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = conn.closed() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Err(e) = conn.send_text(line) {
                        eprintln!("[send] {e}");
                    }
                }
                None => {
                    conn.close();
                    conn.closed().await;
                    break;
                }
            },
        }
    }

    Ok(())
}

// ============================================================================
// Handler
// ============================================================================

fn on_event(event: &Event, conn: &Connection) {
    match event.kind() {
        EventKind::TextMessage => match event.text() {
            Ok(text) => println!("< {text}"),
            Err(e) => eprintln!("[recv] {e}"),
        },
        EventKind::BinaryMessage => match event.data() {
            Ok(data) => println!("< {} bytes", data.len()),
            Err(e) => eprintln!("[recv] {e}"),
        },
        EventKind::Error | EventKind::NetError => eprintln!("[{}] {event}", conn.remote_address()),
        EventKind::Connected | EventKind::Disconnected => println!("{event} {conn}"),
    }
}
