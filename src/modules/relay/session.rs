//! Paired downstream/upstream connection state.

use mio::net::TcpStream;
use mio::{Registry, Token};
use std::net::{Shutdown, SocketAddr};
use std::time::{Duration, Instant};
use tracing::trace;

/// Stable key of a session in the [`SessionTable`](super::SessionTable).
pub type SessionId = u64;

/// Direction of a single relay step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes read from the downstream client, written to the upstream target.
    DownstreamToUpstream,
    /// Bytes read from the upstream target, written to the downstream client.
    UpstreamToDownstream,
}

impl Direction {
    /// The opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::DownstreamToUpstream => Direction::UpstreamToDownstream,
            Direction::UpstreamToDownstream => Direction::DownstreamToUpstream,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::DownstreamToUpstream => write!(f, "downstream->upstream"),
            Direction::UpstreamToDownstream => write!(f, "upstream->downstream"),
        }
    }
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Both handles open, eligible for relay steps.
    Active,
    /// Teardown has started.
    Terminating,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Terminating => write!(f, "terminating"),
        }
    }
}

/// One relayed connection: an accepted downstream handle and the upstream
/// handle opened on its behalf.
///
/// Both handles are set once at construction and never reassigned. A session
/// only ends through [`SessionTable::teardown`](super::SessionTable::teardown).
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    downstream: TcpStream,
    downstream_token: Token,
    upstream: TcpStream,
    upstream_token: Token,
    peer_addr: SocketAddr,
    state: SessionState,
    established_at: Instant,
    bytes_to_upstream: u64,
    bytes_to_downstream: u64,
}

impl Session {
    /// Create an active session from two connected handles.
    pub fn new(
        id: SessionId,
        downstream: TcpStream,
        downstream_token: Token,
        peer_addr: SocketAddr,
        upstream: TcpStream,
        upstream_token: Token,
    ) -> Self {
        Self {
            id,
            downstream,
            downstream_token,
            upstream,
            upstream_token,
            peer_addr,
            state: SessionState::Active,
            established_at: Instant::now(),
            bytes_to_upstream: 0,
            bytes_to_downstream: 0,
        }
    }

    /// Session key.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Address of the downstream client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Watch-set token of the downstream handle.
    pub fn downstream_token(&self) -> Token {
        self.downstream_token
    }

    /// Watch-set token of the upstream handle.
    pub fn upstream_token(&self) -> Token {
        self.upstream_token
    }

    /// Token of the handle read from when relaying in `direction`.
    pub fn source_token(&self, direction: Direction) -> Token {
        match direction {
            Direction::DownstreamToUpstream => self.downstream_token,
            Direction::UpstreamToDownstream => self.upstream_token,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while the session accepts relay steps.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Time since both handles were connected.
    pub fn duration(&self) -> Duration {
        self.established_at.elapsed()
    }

    /// Bytes forwarded from downstream to upstream.
    pub fn bytes_to_upstream(&self) -> u64 {
        self.bytes_to_upstream
    }

    /// Bytes forwarded from upstream to downstream.
    pub fn bytes_to_downstream(&self) -> u64 {
        self.bytes_to_downstream
    }

    /// Borrow the (source, destination) handles for a relay step.
    pub fn endpoints_mut(&mut self, direction: Direction) -> (&mut TcpStream, &mut TcpStream) {
        match direction {
            Direction::DownstreamToUpstream => (&mut self.downstream, &mut self.upstream),
            Direction::UpstreamToDownstream => (&mut self.upstream, &mut self.downstream),
        }
    }

    /// Account bytes written to the destination of `direction`.
    pub fn record_forwarded(&mut self, direction: Direction, bytes: usize) {
        match direction {
            Direction::DownstreamToUpstream => self.bytes_to_upstream += bytes as u64,
            Direction::UpstreamToDownstream => self.bytes_to_downstream += bytes as u64,
        }
    }

    /// Flip to `Terminating`. Returns `false` if teardown had already begun.
    pub(crate) fn begin_teardown(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = SessionState::Terminating;
        was_active
    }

    /// Remove both handles from the watch set and shut both directions down.
    ///
    /// Failures are expected here (the peer may already be gone) and are
    /// swallowed; the sockets themselves are closed when the session drops.
    pub(crate) fn release_handles(&mut self, registry: &Registry) {
        for (side, stream) in [("downstream", &mut self.downstream), ("upstream", &mut self.upstream)] {
            if let Err(e) = registry.deregister(stream) {
                trace!(session = self.id, side, error = %e, "deregister failed");
            }
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                trace!(session = self.id, side, error = %e, "shutdown failed");
            }
        }
    }
}
