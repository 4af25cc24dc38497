//! Configuration validation system.

use super::types::AppConfig;
use std::net::IpAddr;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation issues.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &AppConfig) -> ValidationResult;
}

/// Built-in validator for basic relay checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let relay = &config.relay;

        if relay.name.is_empty() {
            result.add_error(ValidationError::error(
                "relay.name",
                "Relay name cannot be empty",
            ));
        }

        if relay.upstream_host.trim().is_empty() {
            result.add_error(ValidationError::error(
                "relay.upstream_host",
                "Upstream host cannot be empty",
            ));
        }

        if relay.upstream_port == 0 {
            result.add_error(ValidationError::error(
                "relay.upstream_port",
                "Upstream port cannot be 0",
            ));
        }

        if relay.buffer_size == 0 {
            result.add_error(ValidationError::error(
                "relay.buffer_size",
                "Buffer size must be greater than 0",
            ));
        }

        if relay.events_capacity == 0 {
            result.add_error(ValidationError::error(
                "relay.events_capacity",
                "Events capacity must be greater than 0",
            ));
        }

        if relay.listen_port == 0 {
            result.add_error(ValidationError::warning(
                "relay.listen_port",
                "Listen port is 0, an ephemeral port will be assigned",
            ));
        }

        result
    }
}

/// Rejects configurations whose upstream is the relay's own listener, which
/// would feed every session back into itself.
#[derive(Debug, Default)]
pub struct SelfRelayValidator;

impl SelfRelayValidator {
    /// Create a new self-relay validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for SelfRelayValidator {
    fn validate(&self, config: &AppConfig) -> ValidationResult {
        let mut result = ValidationResult::new();
        let relay = &config.relay;

        if relay.listen_port == 0 || relay.listen_port != relay.upstream_port {
            return result;
        }

        let host = relay.upstream_host.trim_start_matches('[').trim_end_matches(']');
        let targets_self = match host.parse::<IpAddr>() {
            Ok(ip) => {
                ip == relay.listen_address
                    || (relay.listen_address.is_unspecified()
                        && (ip.is_loopback() || ip.is_unspecified()))
            },
            Err(_) => {
                host.eq_ignore_ascii_case("localhost")
                    && (relay.listen_address.is_unspecified() || relay.listen_address.is_loopback())
            },
        };

        if targets_self {
            result.add_error(ValidationError::error(
                "relay.upstream_port",
                format!(
                    "Upstream {} points back at the relay listener {}",
                    relay.upstream_target(),
                    relay.listen_addr()
                ),
            ));
        }

        result
    }
}
