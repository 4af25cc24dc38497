//! The lifecycle contract trait.
//!
//! A module is anything the binary starts, monitors and stops as a unit.

use super::{ModuleResult, ModuleStatus};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Metrics payload containing module-specific metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsPayload {
    /// Counter metrics (monotonically increasing).
    pub counters: BTreeMap<String, u64>,

    /// Gauge metrics (can go up and down).
    pub gauges: BTreeMap<String, f64>,
}

impl MetricsPayload {
    /// Creates a new empty metrics payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a counter metric.
    pub fn counter(&mut self, name: impl Into<String>, value: u64) {
        self.counters.insert(name.into(), value);
    }

    /// Adds a gauge metric.
    pub fn gauge(&mut self, name: impl Into<String>, value: f64) {
        self.gauges.insert(name.into(), value);
    }

    /// Formats metrics in Prometheus text format, sorted by name.
    #[must_use]
    pub fn to_prometheus(&self, prefix: &str) -> String {
        let mut output = String::new();

        for (name, value) in &self.counters {
            let _ = writeln!(output, "# TYPE {prefix}_{name} counter");
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        for (name, value) in &self.gauges {
            let _ = writeln!(output, "# TYPE {prefix}_{name} gauge");
            let _ = writeln!(output, "{prefix}_{name} {value}");
        }

        output
    }
}

/// The lifecycle contract every runnable module implements.
///
/// # Lifecycle
///
/// 1. `init()` - Accept configuration
/// 2. `start()` - Begin processing
/// 3. `status()` / `metrics()` / `heartbeat()` - Ongoing monitoring
/// 4. `stop()` - Graceful shutdown
pub trait ModuleContract: Send + Sync {
    /// Configuration accepted by [`init`](Self::init).
    type Config;

    /// Module name, used in logs and as the metrics prefix.
    fn name(&self) -> &str;

    /// Initializes the module with the provided configuration.
    ///
    /// Must not start processing; that happens in `start()`.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::ConfigError` if the configuration is invalid,
    /// or `ModuleError::InvalidState` if the module is running.
    fn init(&mut self, config: Self::Config) -> ModuleResult<()>;

    /// Starts the module's processing.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is already running or cannot start.
    fn start(&mut self) -> ModuleResult<()>;

    /// Stops the module gracefully and releases its resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the module is not running or did not shut down
    /// cleanly.
    fn stop(&mut self) -> ModuleResult<()>;

    /// Returns the current status of the module.
    fn status(&self) -> ModuleStatus;

    /// Returns the current metrics from the module.
    fn metrics(&self) -> MetricsPayload;

    /// Liveness check. Defaults to "status is operational".
    fn heartbeat(&self) -> bool {
        self.status().is_operational()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_payload() {
        let mut payload = MetricsPayload::new();
        payload.counter("sessions_total", 3);
        payload.gauge("sessions_active", 1.0);

        assert_eq!(payload.counters.get("sessions_total"), Some(&3));
        assert_eq!(payload.gauges.get("sessions_active"), Some(&1.0));
    }

    #[test]
    fn test_prometheus_format() {
        let mut payload = MetricsPayload::new();
        payload.counter("b_total", 2);
        payload.counter("a_total", 1);
        payload.gauge("active", 4.0);

        let text = payload.to_prometheus("relay");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "# TYPE relay_a_total counter",
                "relay_a_total 1",
                "# TYPE relay_b_total counter",
                "relay_b_total 2",
                "# TYPE relay_active gauge",
                "relay_active 4",
            ]
        );
    }

    #[test]
    fn test_prometheus_empty() {
        assert!(MetricsPayload::new().to_prometheus("relay").is_empty());
    }
}
