//! Peer address and handshake metadata.

use std::net::SocketAddr;

use tokio_tungstenite::tungstenite::http::HeaderMap;

/// Identity of a connection, fixed when the transport was established.
///
/// Filled in by [`Server`](crate::Server) and [`connect`](crate::connect);
/// callers that bring their own transport fill in whatever they know.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    remote_addr: Option<SocketAddr>,
    uri: Option<String>,
    headers: HeaderMap,
    subprotocol: Option<String>,
}

impl ConnectionInfo {
    /// Creates empty metadata.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the peer address.
    #[inline]
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Sets the request URI of the handshake.
    #[inline]
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the handshake headers.
    ///
    /// On the server these are the client's request headers; on the client
    /// they are the server's response headers.
    #[inline]
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the negotiated subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocol = Some(protocol.into());
        self
    }

    /// Peer address.
    #[inline]
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Handshake request URI.
    #[inline]
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Handshake headers.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Negotiated subprotocol.
    #[inline]
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }
}
