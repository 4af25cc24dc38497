//! The relay step: one bounded receive, then a complete forward.

use super::error::{RelayError, RelayResult};
use super::session::{Direction, Session, SessionId};
use super::stats::RelayStats;
use super::table::SessionTable;
use bytes::BytesMut;
use mio::net::TcpStream;
use mio::{Interest, Registry};
use socket2::SockRef;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Extension point run over every received chunk before it is forwarded.
///
/// Implementations may rewrite the chunk in place, including growing or
/// shrinking it. Whatever is left in `chunk` is sent to the opposite handle.
pub trait PayloadHook: Send {
    /// Process one received chunk.
    fn process(&mut self, session: SessionId, direction: Direction, chunk: &mut BytesMut);
}

/// Identity hook: forwards every chunk untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl PayloadHook for Passthrough {
    #[inline]
    fn process(&mut self, _session: SessionId, _direction: Direction, _chunk: &mut BytesMut) {}
}

/// What a single relay step did.
#[derive(Debug)]
pub enum StepOutcome {
    /// Bytes were received and all of them forwarded.
    Forwarded(usize),
    /// The readiness event was spurious; nothing to read.
    Idle,
    /// The peer closed cleanly and the session was torn down.
    Closed,
    /// An IO error ended the session.
    Failed(RelayError),
    /// The handle no longer belongs to an active session.
    Stale,
}

/// Performs receive-then-forward steps for ready session handles.
///
/// Owns a single scratch buffer reused by every step; each step reads at most
/// `buffer_size` bytes once and never drains the socket.
pub struct Relay {
    scratch: BytesMut,
    buffer_size: usize,
    hook: Box<dyn PayloadHook>,
    stats: Arc<RelayStats>,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("buffer_size", &self.buffer_size)
            .finish()
    }
}

impl Relay {
    /// Create a relay reading at most `buffer_size` bytes per step.
    pub fn new(buffer_size: usize, stats: Arc<RelayStats>) -> Self {
        Self::with_hook(buffer_size, stats, Box::new(Passthrough))
    }

    /// Create a relay with a custom payload hook.
    pub fn with_hook(buffer_size: usize, stats: Arc<RelayStats>, hook: Box<dyn PayloadHook>) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            scratch: BytesMut::with_capacity(buffer_size),
            buffer_size,
            hook,
            stats,
        }
    }

    /// Maximum bytes read per step.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Run one step for the handle of session `id` that feeds `direction`.
    ///
    /// A clean close or any IO failure tears the whole session down through
    /// [`SessionTable::teardown`] before returning.
    pub fn step(
        &mut self,
        table: &mut SessionTable,
        registry: &Registry,
        id: SessionId,
        direction: Direction,
    ) -> StepOutcome {
        let Some(session) = table.get_mut(id) else {
            return StepOutcome::Stale;
        };
        if !session.is_active() {
            return StepOutcome::Stale;
        }

        match self.receive_and_forward(session, registry, direction) {
            Ok(Some(n)) => StepOutcome::Forwarded(n),
            Ok(None) => StepOutcome::Idle,
            Err(RelayError::PeerClosed) => {
                debug!(session = id, %direction, "Peer closed connection");
                if table.teardown(id, registry) {
                    self.stats.session_closed();
                }
                StepOutcome::Closed
            },
            Err(e) => {
                warn!(session = id, %direction, error = %e, "Relay step failed");
                if table.teardown(id, registry) {
                    self.stats.session_failed();
                }
                StepOutcome::Failed(e)
            },
        }
    }

    /// Receive once from the source side and forward everything to the
    /// destination side. `Ok(None)` means there was nothing to read.
    fn receive_and_forward(
        &mut self,
        session: &mut Session,
        registry: &Registry,
        direction: Direction,
    ) -> RelayResult<Option<usize>> {
        let id = session.id();
        let source_token = session.source_token(direction);

        self.scratch.clear();
        self.scratch.resize(self.buffer_size, 0);

        let (source, destination) = session.endpoints_mut(direction);
        let received = match source.read(&mut self.scratch[..]) {
            Ok(0) => return Err(RelayError::PeerClosed),
            Ok(n) => n,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Ok(None);
            },
            Err(e) => return Err(RelayError::Io(e)),
        };
        self.scratch.truncate(received);

        self.hook.process(id, direction, &mut self.scratch);
        send_all(destination, &self.scratch)?;

        // Readiness is edge-triggered and this step never drains, so re-arm
        // the source: leftover data or a pending FIN reports again.
        registry
            .reregister(source, source_token, Interest::READABLE)
            .map_err(RelayError::Registration)?;

        let forwarded = self.scratch.len();
        session.record_forwarded(direction, forwarded);
        match direction {
            Direction::DownstreamToUpstream => self.stats.forwarded_upstream(forwarded as u64),
            Direction::UpstreamToDownstream => self.stats.forwarded_downstream(forwarded as u64),
        }

        trace!(session = id, %direction, received, forwarded, "Relayed chunk");
        Ok(Some(forwarded))
    }
}

/// Write all of `data` to `stream`, blocking until done or failed.
///
/// The stream is normally non-blocking. If the peer's receive window is full
/// the socket is switched to blocking mode for the remainder of the write,
/// which stalls the whole loop until the destination drains.
pub fn send_all(stream: &mut TcpStream, data: &[u8]) -> io::Result<()> {
    let mut written = 0;

    while written < data.len() {
        match stream.write(&data[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted zero bytes",
                ));
            },
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                SockRef::from(&*stream).set_nonblocking(false)?;
                let result = stream.write_all(&data[written..]);
                SockRef::from(&*stream).set_nonblocking(true)?;
                result?;
                written = data.len();
            },
            Err(e) => return Err(e),
        }
    }

    Ok(())
}
