//! Outbound dial.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::timeout;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::{debug, info};
use url::Url;

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionInfo};
use crate::error::{Error, Result};
use crate::event::Event;

// ============================================================================
// connect
// ============================================================================

/// Dials a websocket server and starts a connection on it.
///
/// `http://` and `https://` URLs are accepted and dialed as `ws://` and
/// `wss://`. The configured subprotocols are offered in order; when any are
/// configured, the server must select one of them.
///
/// Dial failures are returned, not dispatched: `handler` only ever sees
/// events of a connection that was established.
///
/// # Errors
///
/// - [`Error::Url`] if `url` does not parse
/// - [`Error::Config`] if the scheme is unsupported or `config` is invalid
/// - [`Error::ConnectionTimeout`] if the handshake exceeds `handshake_timeout`
/// - [`Error::Protocol`] if subprotocol negotiation fails
/// - [`Error::Connection`] for any other dial or handshake failure
pub async fn connect<F>(url: &str, config: ConnectionConfig, handler: F) -> Result<Connection>
where
    F: Fn(&Event, &Connection) + Send + Sync + 'static,
{
    config.validate()?;
    let url = websocket_url(url)?;

    let mut request = url.as_str().into_client_request()?;
    if !config.subprotocols.is_empty() {
        let offered = HeaderValue::from_str(&config.subprotocols.join(", "))
            .map_err(|e| Error::config(format!("invalid subprotocol name: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, offered);
    }

    debug!(%url, "Dialing websocket server");

    let dial = tokio_tungstenite::connect_async_with_config(
        request,
        Some(config.websocket_config()),
        false,
    );
    let dialed = match config.handshake_timeout {
        Some(limit) => timeout(limit, dial).await.map_err(|_| {
            Error::connection_timeout(u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
        })?,
        None => dial.await,
    };
    let (ws_stream, response) = dialed.map_err(dial_error)?;

    let selected = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    if !config.subprotocols.is_empty() {
        match &selected {
            Some(protocol) if config.subprotocols.contains(protocol) => {}
            Some(protocol) => {
                return Err(Error::protocol(format!(
                    "server selected unoffered subprotocol {protocol:?}"
                )));
            }
            None => {
                return Err(Error::protocol("server did not select a subprotocol"));
            }
        }
    }

    let mut info = ConnectionInfo::new()
        .with_uri(url.as_str())
        .with_headers(response.headers().clone());
    if let Some(addr) = peer_addr(ws_stream.get_ref()) {
        info = info.with_remote_addr(addr);
    }
    if let Some(protocol) = selected {
        info = info.with_subprotocol(protocol);
    }

    let connection = Connection::new(ws_stream, info, config, Arc::new(handler))?;
    info!(connection_id = %connection.id(), %url, "Websocket connection established");

    Ok(connection)
}

// ============================================================================
// Helpers
// ============================================================================

/// Parses `raw` and maps HTTP schemes onto their websocket counterparts.
fn websocket_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => return Err(Error::config(format!("unsupported URL scheme: {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("cannot rewrite URL scheme to {scheme}")))?;
    Ok(url)
}

fn dial_error(error: WsError) -> Error {
    match error {
        WsError::Protocol(e) => Error::protocol(format!("WebSocket handshake failed: {e}")),
        other => Error::connection(format!("WebSocket dial failed: {other}")),
    }
}

fn peer_addr(stream: &MaybeTlsStream<tokio::net::TcpStream>) -> Option<SocketAddr> {
    match stream {
        MaybeTlsStream::Plain(tcp) => tcp.peer_addr().ok(),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
