//! # Module Contract
//!
//! The lifecycle contract shared by runnable components: configuration,
//! start/stop, status and metrics reporting.

mod contract;
mod error;
mod status;

pub use contract::{MetricsPayload, ModuleContract};
pub use error::{ModuleError, ModuleResult};
pub use status::ModuleStatus;
