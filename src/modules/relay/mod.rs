//! # TCP Relay Module
//!
//! Single-threaded, readiness-driven TCP relay. Every accepted downstream
//! connection is paired with one freshly opened upstream connection to a
//! fixed target, and bytes are forwarded both ways until either side closes
//! or fails.
//!
//! ## Components
//!
//! - [`Session`]: one downstream handle paired with one upstream handle
//! - [`SessionTable`]: index of live sessions by either handle
//! - [`Relay`]: a single receive-then-forward step for one ready handle
//! - [`Listener`]: accepts a downstream client and connects its upstream
//! - [`EventLoop`]: the readiness multiplexer driving all of the above
//! - [`RelayHandler`]: lifecycle wrapper running the loop on its own thread
//!
//! ## Example Configuration
//!
//! ```toml
//! [relay]
//! name = "db-relay"
//! listen_port = 5432
//! upstream_host = "db.internal"
//! upstream_port = 5432
//! buffer_size = 65536
//! ```

mod config;
mod error;
mod event_loop;
mod forward;
mod handler;
mod listener;
mod session;
mod stats;
mod table;

pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use event_loop::{EventLoop, StopHandle};
pub use forward::{Passthrough, PayloadHook, Relay, StepOutcome};
pub use handler::RelayHandler;
pub use listener::{AcceptOutcome, Listener};
pub use session::{Direction, Session, SessionId, SessionState};
pub use stats::RelayStats;
pub use table::SessionTable;
