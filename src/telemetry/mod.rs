//! Telemetry module
//!
//! Logging and metrics

mod logging;
mod metrics;

pub use logging::{init_logging, normalize_level};
pub use metrics::{increment, record_latency, set_gauge, CounterMetric, GaugeMetric, LatencyMetric};

use crate::config::LoggingConfig;

/// Guard that keeps telemetry alive for the life of the process
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &LoggingConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level, config.log_file.as_deref())?;

    if let Some(ref path) = config.log_file {
        tracing::info!(path = ?path, "Logging to file");
    }

    Ok(TelemetryGuard { _priv: () })
}
