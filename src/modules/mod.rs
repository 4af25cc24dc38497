//! # Modules
//!
//! Runnable components. Each implements
//! [`ModuleContract`](crate::module::ModuleContract) for uniform lifecycle
//! management.
//!
//! ## Available Modules
//!
//! - [`relay`] - Readiness-driven TCP relay to a fixed upstream target

pub mod relay;
