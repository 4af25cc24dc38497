//! Downstream listener and upstream connector.

use std::io;
use std::net::{SocketAddr, TcpStream as StdTcpStream, ToSocketAddrs};

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};
use tracing::{debug, info, warn};

use super::config::RelayConfig;
use super::error::{RelayError, RelayResult};
use super::session::{Session, SessionId};
use super::table::SessionTable;

/// Watch-set token of the listening handle.
pub const LISTENER_TOKEN: Token = Token(0);

/// Result of handling one readiness event on the listening handle.
#[derive(Debug)]
pub enum AcceptOutcome {
    /// A new session was registered and inserted.
    Established(SessionId),
    /// The client was accepted but its upstream could not be reached; the
    /// client handle was closed and no session exists.
    Rejected {
        /// Address of the rejected client.
        peer: SocketAddr,
        /// Why the upstream connect failed.
        error: RelayError,
    },
    /// No connection was pending.
    Idle,
    /// `accept` itself failed; nothing changed.
    Failed(RelayError),
}

/// The listening socket plus the fixed upstream target.
#[derive(Debug)]
pub struct Listener {
    /// Listening socket.
    socket: TcpListener,

    /// The bound address.
    local_addr: SocketAddr,

    /// Upstream `host:port`.
    upstream_target: String,

    /// Apply `TCP_NODELAY` to new handles.
    tcp_nodelay: bool,
}

impl Listener {
    /// Bind and listen on the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Bind`] if the address cannot be bound; this is
    /// the one failure that keeps the relay from starting.
    pub fn bind(config: &RelayConfig) -> RelayResult<Self> {
        let address = config.listen_addr();

        let socket =
            TcpListener::bind(address).map_err(|source| RelayError::Bind { address, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| RelayError::Bind { address, source })?;

        info!(
            name = %config.name,
            address = %local_addr,
            upstream = %config.upstream_target(),
            "TCP relay listener bound"
        );

        Ok(Self {
            socket,
            local_addr,
            upstream_target: config.upstream_target(),
            tcp_nodelay: config.tcp_nodelay,
        })
    }

    /// Get the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The upstream target as `host:port`.
    pub fn upstream_target(&self) -> &str {
        &self.upstream_target
    }

    /// Add the listening handle to the watch set.
    pub fn register(&mut self, registry: &Registry) -> RelayResult<()> {
        registry
            .register(&mut self.socket, LISTENER_TOKEN, Interest::READABLE)
            .map_err(RelayError::Registration)
    }

    /// Remove the listening handle from the watch set.
    pub fn deregister(&mut self, registry: &Registry) -> RelayResult<()> {
        registry
            .deregister(&mut self.socket)
            .map_err(RelayError::Registration)
    }

    /// Accept one pending client, connect its upstream, and register the
    /// resulting session.
    ///
    /// The upstream connect blocks the calling thread until it succeeds or
    /// fails. On failure the client is dropped without a session ever being
    /// created; there is no retry.
    pub fn accept(&mut self, table: &mut SessionTable, registry: &Registry) -> AcceptOutcome {
        self.accept_with(TcpListener::accept, table, registry)
    }

    /// [`Listener::accept`] with the raw accept call supplied by the caller.
    fn accept_with(
        &mut self,
        accept: impl FnOnce(&TcpListener) -> io::Result<(TcpStream, SocketAddr)>,
        table: &mut SessionTable,
        registry: &Registry,
    ) -> AcceptOutcome {
        let accepted = accept(&self.socket);

        // One accept per readiness event. Re-arm whatever happened so a
        // queued client, or one left behind by a failed accept, reports again.
        if let Err(e) = registry.reregister(&mut self.socket, LISTENER_TOKEN, Interest::READABLE) {
            warn!(error = %e, "Failed to re-arm listener");
        }

        let (downstream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return AcceptOutcome::Idle,
            Err(e) => {
                warn!(error = %e, "Transient accept error");
                return AcceptOutcome::Failed(RelayError::Accept(e));
            },
        };

        debug!(peer = %peer, "Accepted downstream connection");

        let upstream = match connect_upstream(&self.upstream_target) {
            Ok(stream) => stream,
            Err(error) => {
                info!(
                    peer = %peer,
                    upstream = %self.upstream_target,
                    error = %error,
                    "Upstream unreachable, rejecting client"
                );
                drop(downstream);
                return AcceptOutcome::Rejected { peer, error };
            },
        };

        if self.tcp_nodelay {
            for stream in [&downstream, &upstream] {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(peer = %peer, error = %e, "Failed to configure stream");
                }
            }
        }

        match Self::register_session(table, registry, downstream, peer, upstream) {
            Ok(id) => {
                info!(session = id, peer = %peer, "Session established");
                AcceptOutcome::Established(id)
            },
            Err(e) => {
                warn!(peer = %peer, error = %e, "Failed to register session");
                AcceptOutcome::Failed(e)
            },
        }
    }

    /// Put both handles in the watch set and the session in the table, or
    /// neither.
    fn register_session(
        table: &mut SessionTable,
        registry: &Registry,
        mut downstream: TcpStream,
        peer: SocketAddr,
        mut upstream: TcpStream,
    ) -> RelayResult<SessionId> {
        let downstream_token = table.next_token();
        let upstream_token = table.next_token();

        registry
            .register(&mut downstream, downstream_token, Interest::READABLE)
            .map_err(RelayError::Registration)?;
        if let Err(e) = registry.register(&mut upstream, upstream_token, Interest::READABLE) {
            let _ = registry.deregister(&mut downstream);
            return Err(RelayError::Registration(e));
        }

        let id = table.next_id();
        let session = Session::new(
            id,
            downstream,
            downstream_token,
            peer,
            upstream,
            upstream_token,
        );
        // Tokens are fresh, so a clash here means a table bug. The dropped
        // handles close and leave the watch set with the session.
        table.insert(session)
    }
}

/// Open a blocking connection to `target`, trying every resolved address in
/// turn, and hand it back in non-blocking mode.
pub fn connect_upstream(target: &str) -> RelayResult<TcpStream> {
    let addrs = target.to_socket_addrs().map_err(|source| RelayError::Resolve {
        target: target.to_string(),
        source,
    })?;

    let mut last_error = None;
    for addr in addrs {
        debug!(upstream = %addr, "Connecting to upstream");
        match StdTcpStream::connect(addr) {
            Ok(stream) => {
                stream.set_nonblocking(true)?;
                return Ok(TcpStream::from_std(stream));
            },
            Err(e) => last_error = Some(e),
        }
    }

    Err(RelayError::Connect {
        target: target.to_string(),
        source: last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")
        }),
    })
}
