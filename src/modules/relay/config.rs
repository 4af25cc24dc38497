//! Configuration types for the relay engine.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Static relay configuration.
///
/// Read once at startup and moved into the event loop; nothing mutates it
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Instance name, used in log output.
    pub name: String,

    /// Address the listening socket binds to.
    pub listen_address: IpAddr,

    /// Port the listening socket binds to (0 = ephemeral).
    pub listen_port: u16,

    /// Upstream host name or IP address.
    pub upstream_host: String,

    /// Upstream port.
    pub upstream_port: u16,

    /// Maximum bytes read from a handle per readiness event.
    pub buffer_size: usize,

    /// Capacity of the readiness event batch.
    pub events_capacity: usize,

    /// Set `TCP_NODELAY` on both sides of every session.
    pub tcp_nodelay: bool,
}

fn default_buffer_size() -> usize {
    64 * 1024 // 64KB
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: "tcp-relay".to_string(),
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            listen_port: 8080,
            upstream_host: "127.0.0.1".to_string(),
            upstream_port: 443,
            buffer_size: default_buffer_size(),
            events_capacity: 1024,
            tcp_nodelay: true,
        }
    }
}

impl RelayConfig {
    /// Create a config relaying `listen_port` to `upstream_host:upstream_port`.
    pub fn new(listen_port: u16, upstream_host: impl Into<String>, upstream_port: u16) -> Self {
        Self {
            listen_port,
            upstream_host: upstream_host.into(),
            upstream_port,
            ..Self::default()
        }
    }

    /// Set the listen address.
    #[must_use]
    pub fn with_listen_address(mut self, address: IpAddr) -> Self {
        self.listen_address = address;
        self
    }

    /// Set the per-read buffer size.
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// The socket address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.listen_port)
    }

    /// The upstream target as `host:port`.
    pub fn upstream_target(&self) -> String {
        // Bare IPv6 literals need brackets to survive `ToSocketAddrs`.
        if self.upstream_host.contains(':') && !self.upstream_host.starts_with('[') {
            format!("[{}]:{}", self.upstream_host, self.upstream_port)
        } else {
            format!("{}:{}", self.upstream_host, self.upstream_port)
        }
    }
}
