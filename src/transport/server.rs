//! Websocket server.
//!
//! Binds a TCP listener, upgrades each accepted stream to a websocket and
//! runs a [`Connection`] on it. Every connection shares the server's handler
//! and configuration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │                Server                   │
//! │            (single port)                │
//! │  accept loop ──► upgrade ──► Connection │
//! │  ┌─────────────────────────────────┐    │
//! │  │ ConnectionId → Connection       │    │
//! │  │ ConnectionId → Connection       │    │
//! │  └─────────────────────────────────┘    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Connections remove themselves from the registry once their
//! `Disconnected` event has been delivered. [`Server::shutdown`] waits for
//! the accept loop and every in-flight upgrade before closing the registry,
//! so no connection outlives it.

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionInfo};
use crate::error::{Error, Result};
use crate::event::{Event, EventHandler};
use crate::identifiers::ConnectionId;

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (localhost, OS-assigned port).
const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for [`Server`].
///
/// # Example
///
/// ```ignore
/// use wsline::{Connection, Event, EventKind, Server};
///
/// let server = Server::builder()
///     .bind("127.0.0.1:8080".parse()?)
///     .path("/ws")
///     .handler(|event: &Event, conn: &Connection| {
///         if event.kind() == EventKind::TextMessage {
///             if let Ok(text) = event.text() {
///                 let _ = conn.send_text(text);
///             }
///         }
///     })
///     .build()
///     .await?;
///
/// println!("listening on {}", server.ws_url());
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    addr: Option<SocketAddr>,
    path: Option<String>,
    config: ConnectionConfig,
    handler: Option<EventHandler>,
}

impl ServerBuilder {
    /// Sets the listen address. Defaults to `127.0.0.1:0`.
    #[inline]
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }

    /// Only accepts upgrades on this request path; others get a 404.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the configuration applied to every connection.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event handler shared by every connection.
    #[must_use]
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Event, &Connection) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Binds the listener and starts the accept loop.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no handler was set or the configuration is invalid
    /// - [`Error::Io`] if binding fails
    pub async fn build(self) -> Result<Arc<Server>> {
        let handler = self
            .handler
            .ok_or_else(|| Error::config("server requires an event handler"))?;
        self.config.validate()?;

        if let Some(path) = &self.path
            && !path.starts_with('/')
        {
            return Err(Error::config(format!("path must start with '/': {path}")));
        }

        let listener = TcpListener::bind(self.addr.unwrap_or(DEFAULT_BIND_ADDR)).await?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "Websocket server bound");

        let server = Arc::new(Server {
            local_addr,
            path: self.path,
            config: self.config,
            handler,
            connections: RwLock::new(FxHashMap::default()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        let accept = Arc::clone(&server);
        server.tasks.spawn(async move {
            accept.accept_loop(listener).await;
        });

        info!(%local_addr, "Websocket server started");

        Ok(server)
    }
}

// ============================================================================
// Server
// ============================================================================

/// A running websocket server.
pub struct Server {
    /// Address the listener is bound to.
    local_addr: SocketAddr,

    /// Required request path, if any.
    path: Option<String>,

    /// Applied to every connection.
    config: ConnectionConfig,

    /// Shared by every connection.
    handler: EventHandler,

    /// Live connections.
    connections: RwLock<FxHashMap<ConnectionId, Connection>>,

    /// Stops the accept loop and pending upgrades.
    shutdown: CancellationToken,

    /// Accept loop and in-flight upgrades.
    tasks: TaskTracker,
}

// ============================================================================
// Server - Public API
// ============================================================================

impl Server {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// Returns the address the listener is bound to.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a URL clients can dial.
    ///
    /// A wildcard bind address is reported as loopback.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let ip = match self.local_addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        format!(
            "ws://{}{}",
            SocketAddr::new(ip, self.local_addr.port()),
            self.path.as_deref().unwrap_or("")
        )
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    /// Returns a live connection by ID.
    #[must_use]
    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.read().get(&id).cloned()
    }

    /// Returns every live connection.
    #[must_use]
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.read().values().cloned().collect()
    }

    /// Stops accepting and closes every live connection.
    ///
    /// Returns once each of them has delivered `Disconnected`.
    pub async fn shutdown(&self) {
        info!(local_addr = %self.local_addr, "Websocket server shutting down");

        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        let connections: Vec<_> = {
            let mut map = self.connections.write();
            map.drain().map(|(_, connection)| connection).collect()
        };

        for connection in &connections {
            connection.close();
        }
        for connection in connections {
            connection.closed().await;
            debug!(connection_id = %connection.id(), "Connection closed during shutdown");
        }

        info!("Websocket server shutdown complete");
    }
}

// ============================================================================
// Server - Accept Loop
// ============================================================================

impl Server {
    /// Background task that accepts new connections.
    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        debug!("Accept loop started");

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    debug!("Accept loop shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let server = Arc::clone(&self);
                        self.tasks.spawn(async move {
                            if let Err(e) = server.handle_connection(stream, addr).await {
                                warn!(error = %e, ?addr, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                },
            }
        }

        debug!("Accept loop terminated");
    }

    /// Upgrades one accepted stream and starts its connection.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(?addr, "New TCP connection");

        let mut info = ConnectionInfo::new().with_remote_addr(addr);
        let callback = |request: &Request,
                        response: Response|
         -> std::result::Result<Response, ErrorResponse> {
            let (response, accepted) = self.negotiate(request, response)?;
            info = accepted.with_remote_addr(addr);
            Ok(response)
        };

        let upgrade = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            callback,
            Some(self.config.websocket_config()),
        );

        let handshake_timeout = self.config.handshake_timeout;
        let upgraded = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => {
                debug!(?addr, "Server shut down during upgrade");
                return Ok(());
            }

            upgraded = async {
                match handshake_timeout {
                    Some(limit) => timeout(limit, upgrade).await.map_err(|_| {
                        Error::connection_timeout(
                            u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        )
                    }),
                    None => Ok(upgrade.await),
                }
            } => upgraded?,
        };
        let ws_stream =
            upgraded.map_err(|e| Error::connection(format!("WebSocket upgrade failed: {e}")))?;

        let connection = Connection::new(
            ws_stream,
            info,
            self.config.clone(),
            Arc::clone(&self.handler),
        )?;
        let id = connection.id();

        // Checked under the registry lock so shutdown either drains this
        // connection or is seen here.
        let registered = {
            let mut connections = self.connections.write();
            let open = !self.shutdown.is_cancelled();
            if open {
                connections.insert(id, connection.clone());
            }
            open
        };

        if !registered {
            debug!(connection_id = %id, ?addr, "Server shut down during setup");
            connection.close();
            connection.closed().await;
            return Ok(());
        }

        info!(connection_id = %id, ?addr, "Websocket connection established");

        let registry = Arc::downgrade(&self);
        tokio::spawn(unregister_when_closed(registry, connection));

        Ok(())
    }

    /// Upgrade callback: path check, subprotocol selection, metadata capture.
    fn negotiate(
        &self,
        request: &Request,
        mut response: Response,
    ) -> std::result::Result<(Response, ConnectionInfo), ErrorResponse> {
        if let Some(path) = &self.path
            && request.uri().path() != path
        {
            debug!(requested = request.uri().path(), "Rejecting upgrade on unknown path");
            let mut rejection = ErrorResponse::new(Some("Not Found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }

        let mut info = ConnectionInfo::new()
            .with_uri(request.uri().to_string())
            .with_headers(request.headers().clone());

        let offered = request
            .headers()
            .get_all(SEC_WEBSOCKET_PROTOCOL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .collect::<Vec<_>>();

        let selected = self
            .config
            .subprotocols
            .iter()
            .find(|protocol| offered.contains(&protocol.as_str()));

        if let Some(protocol) = selected
            && let Ok(value) = HeaderValue::from_str(protocol)
        {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
            info = info.with_subprotocol(protocol.clone());
        }

        Ok((response, info))
    }
}

/// Removes a connection from the registry after its last event.
async fn unregister_when_closed(registry: Weak<Server>, connection: Connection) {
    connection.closed().await;
    if let Some(server) = registry.upgrade() {
        server.connections.write().remove(&connection.id());
        debug!(connection_id = %connection.id(), "Connection unregistered");
    }
}

// ============================================================================
// Tests
// ============================================================================
