//! Hooks for observing and rewriting intercepted traffic.
use crate::error::{Error, Result};
use crate::parser::BodyBytesType;
use crate::protocol::{HttpRequest, HttpResponse};
use crate::ssl::{ClientConfig, ServerConfig};
use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

/// A `host:port` pair as it appears in a CONNECT request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAddress {
    host: String,
    port: u16,
}

impl TargetAddress {
    pub fn new<H: Into<String>>(host: H, port: u16) -> Self {
        TargetAddress {
            host: host.into(),
            port,
        }
    }

    /// Parses `host:port`. IPv6 hosts must be in brackets.
    pub fn parse(request_target: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidTarget(format!(
                "{:?} is not in the format host:port",
                request_target
            ))
        };
        let colon = request_target.rfind(':').ok_or_else(invalid)?;
        let (host, port) = (&request_target[..colon], &request_target[colon + 1..]);
        if host.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        url::Host::parse(host).map_err(|e| Error::InvalidTarget(format!("{}: {}", host, e)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Ok(TargetAddress::new(host, port))
    }

    /// The host, without brackets for IPv6 addresses.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl ToSocketAddrs for TargetAddress {
    type Iter = std::vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}


/// Where an accepted connection goes and which TLS settings each leg uses.
#[derive(Clone)]
pub struct ConnectionInfo {
    target: TargetAddress,
    server_tls: Arc<ServerConfig>,
    client_tls: Arc<ClientConfig>,
}

impl ConnectionInfo {
    pub fn new(
        target: TargetAddress,
        server_tls: Arc<ServerConfig>,
        client_tls: Arc<ClientConfig>,
    ) -> Self {
        ConnectionInfo {
            target,
            server_tls,
            client_tls,
        }
    }

    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    /// Used for the handshake with the client.
    pub fn server_tls(&self) -> Arc<ServerConfig> {
        self.server_tls.clone()
    }

    /// Used for the handshake with the target.
    pub fn client_tls(&self) -> Arc<ClientConfig> {
        self.client_tls.clone()
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("target", &self.target)
            .finish()
    }
}

/// Decides which CONNECT requests get intercepted and sees the traffic of
/// the ones that do.
///
/// Callbacks run on the connection's pump threads: request callbacks on the
/// client-to-target thread, response callbacks on the target-to-client one.
/// Header callbacks run before the headers are forwarded, so changes made
/// there are what the other side receives.
pub trait ConnectionInterceptor: Send + Sync + 'static {
    /// Returns where to connect to, or `None` to close the client connection.
    fn accept_connection(
        &self,
        client: SocketAddr,
        method: &str,
        request_target: &str,
        http_version: &str,
    ) -> Option<ConnectionInfo>;

    fn on_request_headers_ready(&self, _connection: &ConnectionInfo, _request: &mut HttpRequest) {}

    fn on_request_body_bytes(
        &self,
        _connection: &ConnectionInfo,
        _request: &HttpRequest,
        _kind: BodyBytesType,
        _bytes: &[u8],
    ) {
    }

    fn on_request_ended(&self, _connection: &ConnectionInfo, _request: &HttpRequest) {}

    fn on_request_error(&self, _connection: &ConnectionInfo, _request: &HttpRequest, _error: &Error) {}

    /// Not called for `100 Continue`.
    fn on_response_headers_ready(
        &self,
        _connection: &ConnectionInfo,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
    ) {
    }

    fn on_response_body_bytes(
        &self,
        _connection: &ConnectionInfo,
        _request: &HttpRequest,
        _response: &HttpResponse,
        _kind: BodyBytesType,
        _bytes: &[u8],
    ) {
    }

    fn on_response_ended(
        &self,
        _connection: &ConnectionInfo,
        _request: &HttpRequest,
        _response: &HttpResponse,
    ) {
    }

    fn on_response_error(
        &self,
        _connection: &ConnectionInfo,
        _request: Option<&HttpRequest>,
        _response: &HttpResponse,
        _error: &Error,
    ) {
    }

    /// Both directions have finished, with their errors if any.
    fn on_connection_ended(
        &self,
        _connection: &ConnectionInfo,
        _client_to_target_error: Option<&Error>,
        _target_to_client_error: Option<&Error>,
    ) {
    }
}
