use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Settings for an [`InterceptingProxy`](crate::proxy::InterceptingProxy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub bind_address: IpAddr,
    /// 0 picks a free port.
    pub port: u16,
    /// Largest plaintext CONNECT request head accepted from a client.
    pub max_connect_head_bytes: usize,
    /// Forward the SNI name the client sent to the target, instead of the
    /// target's host.
    pub proxy_server_names: bool,
    /// Applied to both legs of each connection. `None` blocks forever.
    pub read_timeout: Option<Duration>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            max_connect_head_bytes: 8 * 1024,
            proxy_server_names: false,
            read_timeout: None,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_max_connect_head_bytes(mut self, max_connect_head_bytes: usize) -> Self {
        self.max_connect_head_bytes = max_connect_head_bytes;
        self
    }

    pub fn with_proxy_server_names(mut self, proxy_server_names: bool) -> Self {
        self.proxy_server_names = proxy_server_names;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.socket_address(), "127.0.0.1:0".parse().unwrap());
        assert_eq!(config.max_connect_head_bytes, 8192);
        assert!(!config.proxy_server_names);
        assert_eq!(config.read_timeout, None);
    }

    #[test]
    fn builders() {
        let config = ProxyConfig::new()
            .with_bind_address("0.0.0.0".parse().unwrap())
            .with_port(8080)
            .with_max_connect_head_bytes(100)
            .with_proxy_server_names(true)
            .with_read_timeout(Some(Duration::from_secs(30)));
        assert_eq!(config.socket_address(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.max_connect_head_bytes, 100);
        assert!(config.proxy_server_names);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
    }
}
