//! Session table: the single source of truth for live pairings.

use super::error::{RelayError, RelayResult};
use super::session::{Direction, Session, SessionId};
use mio::{Registry, Token};
use std::collections::HashMap;
use tracing::debug;

/// First token handed out to session handles. Lower values are reserved for
/// the listener.
const FIRST_SESSION_TOKEN: usize = 1;

/// Arena of live sessions with a direct index from either handle.
///
/// A session is present under both of its tokens or under neither. Tokens
/// are allocated monotonically and never reused, so a readiness event that
/// arrives for an already torn down handle can never resolve to a newer
/// session.
#[derive(Debug)]
pub struct SessionTable {
    /// Live sessions by ID.
    sessions: HashMap<SessionId, Session>,

    /// Downstream token -> session.
    by_downstream: HashMap<Token, SessionId>,

    /// Upstream token -> session.
    by_upstream: HashMap<Token, SessionId>,

    /// Next session ID.
    next_id: SessionId,

    /// Next handle token.
    next_token: usize,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_downstream: HashMap::new(),
            by_upstream: HashMap::new(),
            next_id: 1,
            next_token: FIRST_SESSION_TOKEN,
        }
    }

    /// Generate a new unique session ID.
    pub fn next_id(&mut self) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocate a fresh watch-set token for a session handle.
    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Insert a session under both of its handles.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateHandle`] if either token already belongs
    /// to a live session; the table is left untouched in that case.
    pub fn insert(&mut self, session: Session) -> RelayResult<SessionId> {
        let id = session.id();
        let downstream = session.downstream_token();
        let upstream = session.upstream_token();

        for token in [downstream, upstream] {
            if self.contains_handle(token) {
                return Err(RelayError::DuplicateHandle(token.0));
            }
        }
        if downstream == upstream {
            return Err(RelayError::DuplicateHandle(downstream.0));
        }

        self.by_downstream.insert(downstream, id);
        self.by_upstream.insert(upstream, id);
        self.sessions.insert(id, session);
        Ok(id)
    }

    /// Resolve a downstream handle to its session.
    pub fn lookup_by_downstream(&self, token: Token) -> Option<SessionId> {
        self.by_downstream.get(&token).copied()
    }

    /// Resolve an upstream handle to its session.
    pub fn lookup_by_upstream(&self, token: Token) -> Option<SessionId> {
        self.by_upstream.get(&token).copied()
    }

    /// Resolve any handle to its session and the direction a read on it feeds.
    pub fn resolve(&self, token: Token) -> Option<(SessionId, Direction)> {
        if let Some(id) = self.lookup_by_downstream(token) {
            return Some((id, Direction::DownstreamToUpstream));
        }
        self.lookup_by_upstream(token)
            .map(|id| (id, Direction::UpstreamToDownstream))
    }

    /// Get a session.
    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    /// Get a session mutably.
    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Remove a session and both of its index entries.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_downstream.remove(&session.downstream_token());
        self.by_upstream.remove(&session.upstream_token());
        Some(session)
    }

    /// End a session: take both handles out of the watch set, shut them down,
    /// drop the table entries and close the sockets.
    ///
    /// This is the only way a session is destroyed. Calling it for a session
    /// that is already gone is a no-op and returns `false`.
    pub fn teardown(&mut self, id: SessionId, registry: &Registry) -> bool {
        let Some(mut session) = self.remove(id) else {
            return false;
        };

        session.begin_teardown();
        session.release_handles(registry);

        debug!(
            session = id,
            peer = %session.peer_addr(),
            bytes_to_upstream = session.bytes_to_upstream(),
            bytes_to_downstream = session.bytes_to_downstream(),
            duration_ms = session.duration().as_millis() as u64,
            "Session torn down"
        );

        // Dropping the session closes both sockets.
        drop(session);
        true
    }

    /// Tear down every live session. Returns how many were ended.
    pub fn teardown_all(&mut self, registry: &Registry) -> usize {
        self.session_ids()
            .into_iter()
            .filter(|&id| self.teardown(id, registry))
            .count()
    }

    /// IDs of all live sessions, in ascending order.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns `true` if `token` belongs to a live session on either side.
    pub fn contains_handle(&self, token: Token) -> bool {
        self.by_downstream.contains_key(&token) || self.by_upstream.contains_key(&token)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::relay::test_util::connected_pair;
    use mio::{Interest, Poll};
    use std::io::Read;
    use std::net::TcpStream;
    use std::time::Duration;

    struct Peers {
        client: TcpStream,
        target: TcpStream,
    }

    fn make_session(table: &mut SessionTable) -> (Session, Peers) {
        let (downstream, client) = connected_pair();
        let (upstream, target) = connected_pair();
        let peer = client.local_addr().unwrap();
        let id = table.next_id();
        let down_token = table.next_token();
        let up_token = table.next_token();
        let session = Session::new(id, downstream, down_token, peer, upstream, up_token);
        (session, Peers { client, target })
    }

    fn assert_closed(stream: &mut TcpStream) {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut buf = [0u8; 8];
        // EOF or reset both mean the relay side is gone.
        match stream.read(&mut buf) {
            Ok(n) => assert_eq!(n, 0),
            Err(e) => assert_ne!(e.kind(), std::io::ErrorKind::WouldBlock),
        }
    }

    #[test]
    fn test_table_new() {
        let table = SessionTable::new();
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert!(table.session_ids().is_empty());
    }

    #[test]
    fn test_tokens_unique_and_not_listener() {
        let mut table = SessionTable::new();
        let mut tokens = Vec::new();
        for _ in 0..100 {
            tokens.push(table.next_token());
        }

        assert!(tokens.iter().all(|t| t.0 >= FIRST_SESSION_TOKEN));
        let unique: std::collections::HashSet<_> = tokens.iter().collect();
        assert_eq!(unique.len(), 100);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = SessionTable::new();
        let (session, _peers) = make_session(&mut table);
        let down = session.downstream_token();
        let up = session.upstream_token();

        let id = table.insert(session).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup_by_downstream(down), Some(id));
        assert_eq!(table.lookup_by_upstream(up), Some(id));
        assert_eq!(table.lookup_by_downstream(up), None);
        assert_eq!(table.lookup_by_upstream(down), None);

        assert_eq!(table.resolve(down), Some((id, Direction::DownstreamToUpstream)));
        assert_eq!(table.resolve(up), Some((id, Direction::UpstreamToDownstream)));
        assert_eq!(table.resolve(Token(9999)), None);
    }

    #[test]
    fn test_insert_duplicate_handle() {
        let mut table = SessionTable::new();
        let (first, _p1) = make_session(&mut table);
        let taken = first.upstream_token();
        table.insert(first).unwrap();

        let (downstream, _client) = connected_pair();
        let (upstream, _target) = connected_pair();
        let peer = "127.0.0.1:1".parse().unwrap();
        let id = table.next_id();
        let fresh = table.next_token();
        // Reuses the first session's upstream token as its downstream token.
        let clash = Session::new(id, downstream, taken, peer, upstream, fresh);

        let err = table.insert(clash).unwrap_err();
        assert!(matches!(err, RelayError::DuplicateHandle(t) if t == taken.0));
        assert_eq!(table.len(), 1);
        assert!(!table.contains_handle(fresh));
    }

    #[test]
    fn test_remove_is_atomic() {
        let mut table = SessionTable::new();
        let (session, _peers) = make_session(&mut table);
        let down = session.downstream_token();
        let up = session.upstream_token();
        let id = table.insert(session).unwrap();

        let removed = table.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(table.is_empty());
        assert!(!table.contains_handle(down));
        assert!(!table.contains_handle(up));
        assert!(table.remove(id).is_none());
    }

    #[test]
    fn test_teardown_closes_both_and_is_idempotent() {
        let poll = Poll::new().unwrap();
        let mut table = SessionTable::new();
        let (mut session, mut peers) = make_session(&mut table);
        let down = session.downstream_token();
        let up = session.upstream_token();
        {
            let (d, u) = session.endpoints_mut(Direction::DownstreamToUpstream);
            poll.registry().register(d, down, Interest::READABLE).unwrap();
            poll.registry().register(u, up, Interest::READABLE).unwrap();
        }
        let id = table.insert(session).unwrap();

        assert!(table.teardown(id, poll.registry()));
        assert!(table.is_empty());
        assert!(!table.contains_handle(down));
        assert!(!table.contains_handle(up));

        assert_closed(&mut peers.client);
        assert_closed(&mut peers.target);

        // Second teardown of the same session is a no-op.
        assert!(!table.teardown(id, poll.registry()));
    }

    #[test]
    fn test_teardown_unregistered_session() {
        // Handles that never made it into the watch set still close cleanly.
        let poll = Poll::new().unwrap();
        let mut table = SessionTable::new();
        let (session, mut peers) = make_session(&mut table);
        let id = table.insert(session).unwrap();

        assert!(table.teardown(id, poll.registry()));
        assert_closed(&mut peers.client);
    }

    #[test]
    fn test_teardown_all() {
        let poll = Poll::new().unwrap();
        let mut table = SessionTable::new();
        let mut peers = Vec::new();
        for _ in 0..4 {
            let (session, p) = make_session(&mut table);
            table.insert(session).unwrap();
            peers.push(p);
        }
        assert_eq!(table.len(), 4);

        assert_eq!(table.teardown_all(poll.registry()), 4);
        assert!(table.is_empty());
        assert_eq!(table.teardown_all(poll.registry()), 0);
    }

    #[test]
    fn test_session_ids_sorted() {
        let mut table = SessionTable::new();
        let mut peers = Vec::new();
        for _ in 0..3 {
            let (session, p) = make_session(&mut table);
            table.insert(session).unwrap();
            peers.push(p);
        }

        assert_eq!(table.session_ids(), vec![1, 2, 3]);
    }
}
