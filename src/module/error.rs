//! Module error types and result aliases.

use crate::modules::relay::RelayError;
use thiserror::Error;

/// Result type alias for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Errors that can occur during module lifecycle operations.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Module failed to start.
    #[error("start failed: {0}")]
    StartFailed(String),

    /// Module failed to stop gracefully.
    #[error("stop failed: {0}")]
    StopFailed(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Module is in an invalid state for the requested operation.
    #[error("invalid state: current={current}, expected={expected}")]
    InvalidState {
        /// Current state of the module.
        current: String,
        /// Expected state for the operation.
        expected: String,
    },

    /// Error from the relay engine.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl ModuleError {
    /// Returns `true` if the relay could not start at all.
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, Self::Relay(e) if e.is_fatal()) || matches!(self, Self::StartFailed(_))
    }
}
