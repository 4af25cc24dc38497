//! # tcp-relay
//!
//! A single-threaded, readiness-driven TCP relay. Every client accepted on
//! the listening port is paired with a fresh connection to one fixed upstream
//! target, and bytes are copied both ways until either side closes.
//!
//! ## Architecture
//!
//! - [`modules::relay`]: the relay engine (listener, session table, event
//!   loop) and its [`RelayHandler`](modules::relay::RelayHandler)
//! - [`module`]: the lifecycle contract the handler implements
//! - [`config`]: TOML configuration and validation
//! - [`logging`]: `tracing` subscriber setup for the binary

pub mod config;
pub mod logging;
pub mod module;
pub mod modules;
