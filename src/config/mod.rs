//! # Configuration System
//!
//! TOML-based configuration for the relay binary: parsing, defaults and
//! validation. The relay section is handed to the engine once at startup and
//! never reloaded.
//!
//! ## Example Configuration
//!
//! ```toml
//! [relay]
//! name = "edge-relay"
//! listen_address = "0.0.0.0"
//! listen_port = 8080
//! upstream_host = "backend.internal"
//! upstream_port = 443
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{AppConfig, LogFormat, LogLevel, LoggingConfig};
pub use validation::{
    BasicValidator, SelfRelayValidator, ValidationError, ValidationResult, ValidationSeverity,
    Validator,
};
