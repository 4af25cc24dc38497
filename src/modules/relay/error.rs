//! Error types for the relay engine.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur while running the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Failed to bind or listen on the configured address.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        /// The address that failed to bind.
        address: SocketAddr,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Accepting a pending downstream connection failed.
    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),

    /// The upstream target could not be resolved.
    #[error("failed to resolve upstream {target}: {source}")]
    Resolve {
        /// The configured `host:port`.
        target: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The upstream target refused or dropped the connection attempt.
    #[error("failed to connect to upstream {target}: {source}")]
    Connect {
        /// The configured `host:port`.
        target: String,
        /// The last connect error.
        #[source]
        source: io::Error,
    },

    /// The readiness wait returned an error.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    /// Registering or deregistering a handle with the watch set failed.
    #[error("failed to update watch set: {0}")]
    Registration(#[source] io::Error),

    /// A handle is already owned by a live session.
    #[error("handle {0} is already owned by a live session")]
    DuplicateHandle(usize),

    /// The peer closed its side of the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// IO error during receive or send.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The relay is already running.
    #[error("relay is already running")]
    AlreadyRunning,

    /// The relay is not running.
    #[error("relay is not running")]
    NotRunning,
}

impl RelayError {
    /// Returns `true` if the error prevents the relay from starting at all.
    ///
    /// Every other error is local to a single accept attempt or session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Bind { .. } | RelayError::AlreadyRunning)
    }

    /// Returns `true` if the error ends a session without any fault on our side.
    pub fn is_graceful(&self) -> bool {
        matches!(self, RelayError::PeerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RelayError::Connect {
            target: "backend.internal:443".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("backend.internal:443"));

        let err = RelayError::DuplicateHandle(7);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "broken");
        let err: RelayError = io_err.into();
        assert!(matches!(err, RelayError::Io(_)));
    }

    #[test]
    fn test_is_fatal() {
        let bind = RelayError::Bind {
            address: "127.0.0.1:1".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(bind.is_fatal());
        assert!(RelayError::AlreadyRunning.is_fatal());

        assert!(!RelayError::Accept(io::Error::new(io::ErrorKind::Other, "x")).is_fatal());
        assert!(!RelayError::Poll(io::Error::new(io::ErrorKind::Interrupted, "x")).is_fatal());
        assert!(!RelayError::PeerClosed.is_fatal());
    }

    #[test]
    fn test_is_graceful() {
        assert!(RelayError::PeerClosed.is_graceful());
        assert!(!RelayError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")).is_graceful());
    }
}
