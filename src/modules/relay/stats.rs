//! Relay counters shared with the lifecycle handler.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic relay statistics.
///
/// Written only by the event loop thread; read from anywhere.
#[derive(Debug, Default)]
pub struct RelayStats {
    /// Sessions established (accept and upstream connect both succeeded).
    pub sessions_total: AtomicU64,
    /// Sessions currently live.
    pub sessions_active: AtomicU64,
    /// Sessions that ended because a peer closed cleanly.
    pub sessions_closed: AtomicU64,
    /// Sessions that ended on an IO error.
    pub sessions_failed: AtomicU64,
    /// Downstream connections rejected because the upstream was unreachable.
    pub upstream_failures: AtomicU64,
    /// Failed accept calls.
    pub accept_errors: AtomicU64,
    /// Failed readiness waits.
    pub poll_errors: AtomicU64,
    /// Bytes forwarded from downstream to upstream.
    pub bytes_to_upstream: AtomicU64,
    /// Bytes forwarded from upstream to downstream.
    pub bytes_to_downstream: AtomicU64,
}

impl RelayStats {
    /// Create new relay stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an established session.
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session ended by a clean close.
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session ended by an error.
    pub fn session_failed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
        self.sessions_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session swept at shutdown.
    pub fn session_swept(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a rejected downstream connection.
    pub fn upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed accept.
    pub fn accept_error(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed readiness wait.
    pub fn poll_error(&self) {
        self.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes forwarded to the upstream target.
    pub fn forwarded_upstream(&self, bytes: u64) {
        self.bytes_to_upstream.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record bytes forwarded to the downstream client.
    pub fn forwarded_downstream(&self, bytes: u64) {
        self.bytes_to_downstream.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get current live sessions.
    pub fn active_sessions(&self) -> u64 {
        self.sessions_active.load(Ordering::Relaxed)
    }

    /// Get total established sessions.
    pub fn total_sessions(&self) -> u64 {
        self.sessions_total.load(Ordering::Relaxed)
    }

    /// Get sessions ended by a clean close.
    pub fn total_sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::Relaxed)
    }

    /// Get sessions ended by an error.
    pub fn total_sessions_failed(&self) -> u64 {
        self.sessions_failed.load(Ordering::Relaxed)
    }

    /// Get total failed accepts.
    pub fn total_accept_errors(&self) -> u64 {
        self.accept_errors.load(Ordering::Relaxed)
    }

    /// Get total failed readiness waits.
    pub fn total_poll_errors(&self) -> u64 {
        self.poll_errors.load(Ordering::Relaxed)
    }

    /// Get total rejected downstream connections.
    pub fn total_upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }

    /// Get total bytes forwarded to the upstream target.
    pub fn total_bytes_to_upstream(&self) -> u64 {
        self.bytes_to_upstream.load(Ordering::Relaxed)
    }

    /// Get total bytes forwarded to downstream clients.
    pub fn total_bytes_to_downstream(&self) -> u64 {
        self.bytes_to_downstream.load(Ordering::Relaxed)
    }
}
