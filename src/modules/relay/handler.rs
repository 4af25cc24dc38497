//! Relay handler implementing ModuleContract.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info};

use super::config::RelayConfig;
use super::error::RelayError;
use super::event_loop::{EventLoop, StopHandle};
use super::stats::RelayStats;
use crate::module::{MetricsPayload, ModuleContract, ModuleError, ModuleResult, ModuleStatus};

/// Runs the relay event loop on a dedicated thread.
#[derive(Debug)]
pub struct RelayHandler {
    /// Configuration.
    config: RelayConfig,

    /// Current status.
    status: ModuleStatus,

    /// Counters of the current (or last) run.
    stats: Arc<RelayStats>,

    /// Bound address while running.
    local_addr: Option<SocketAddr>,

    /// Stop signal for the running loop.
    stop: Option<StopHandle>,

    /// Event loop thread.
    worker: Option<JoinHandle<()>>,
}

impl RelayHandler {
    /// Create a stopped handler with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            status: ModuleStatus::Stopped,
            stats: Arc::new(RelayStats::new()),
            local_addr: None,
            stop: None,
            worker: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// The bound listening address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Counters of the current run.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for RelayHandler {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl ModuleContract for RelayHandler {
    type Config = RelayConfig;

    fn name(&self) -> &str {
        &self.config.name
    }

    fn init(&mut self, config: RelayConfig) -> ModuleResult<()> {
        if self.is_running() {
            return Err(ModuleError::InvalidState {
                current: self.status.to_string(),
                expected: "stopped".to_string(),
            });
        }

        if config.upstream_host.is_empty() {
            return Err(ModuleError::ConfigError(
                "upstream_host must not be empty".to_string(),
            ));
        }
        if config.upstream_port == 0 {
            return Err(ModuleError::ConfigError(
                "upstream_port must not be 0".to_string(),
            ));
        }
        if config.buffer_size == 0 {
            return Err(ModuleError::ConfigError(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        self.config = config;
        self.status = ModuleStatus::Initializing;
        info!(name = %self.config.name, "TCP relay module initialized");
        Ok(())
    }

    fn start(&mut self) -> ModuleResult<()> {
        if self.is_running() {
            return Err(RelayError::AlreadyRunning.into());
        }

        let event_loop = match EventLoop::bind(&self.config) {
            Ok(event_loop) => event_loop,
            Err(e) => {
                error!(name = %self.config.name, error = %e, "TCP relay failed to start");
                self.status = ModuleStatus::Error {
                    message: e.to_string(),
                };
                return Err(e.into());
            },
        };

        let local_addr = event_loop.local_addr();
        let stats = event_loop.stats();
        let stop = event_loop.stop_handle();

        let worker = std::thread::Builder::new()
            .name("relay-loop".to_string())
            .spawn(move || event_loop.run())
            .map_err(|e| {
                self.status = ModuleStatus::Error {
                    message: e.to_string(),
                };
                ModuleError::StartFailed(format!("failed to spawn event loop thread: {e}"))
            })?;

        self.stats = stats;
        self.local_addr = Some(local_addr);
        self.stop = Some(stop);
        self.worker = Some(worker);
        self.status = ModuleStatus::Running;

        info!(name = %self.config.name, address = %local_addr, "TCP relay module started");
        Ok(())
    }

    fn stop(&mut self) -> ModuleResult<()> {
        let Some(worker) = self.worker.take() else {
            return Err(RelayError::NotRunning.into());
        };

        self.status = ModuleStatus::Stopping;
        if let Some(stop) = self.stop.take() {
            stop.stop();
        }

        let joined = worker.join();
        self.local_addr = None;

        if joined.is_err() {
            self.status = ModuleStatus::Error {
                message: "event loop thread panicked".to_string(),
            };
            return Err(ModuleError::StopFailed(
                "event loop thread panicked".to_string(),
            ));
        }

        self.status = ModuleStatus::Stopped;
        info!(name = %self.config.name, "TCP relay module stopped");
        Ok(())
    }

    fn status(&self) -> ModuleStatus {
        self.status.clone()
    }

    fn metrics(&self) -> MetricsPayload {
        let mut payload = MetricsPayload::new();
        let stats = &self.stats;

        payload.counter("sessions_total", stats.total_sessions());
        payload.gauge("sessions_active", stats.active_sessions() as f64);
        payload.counter("sessions_closed_total", stats.total_sessions_closed());
        payload.counter("sessions_failed_total", stats.total_sessions_failed());
        payload.counter("upstream_failures_total", stats.total_upstream_failures());
        payload.counter("accept_errors_total", stats.total_accept_errors());
        payload.counter("poll_errors_total", stats.total_poll_errors());
        payload.counter("bytes_to_upstream_total", stats.total_bytes_to_upstream());
        payload.counter("bytes_to_downstream_total", stats.total_bytes_to_downstream());

        payload
    }
}

impl Drop for RelayHandler {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
