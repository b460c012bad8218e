//! Structured logging setup

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Map a log level name to an `EnvFilter` directive
///
/// Accepts the usual tracing names plus `WARNING` and `CRITICAL`.
pub fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" | "fatal" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_string(),
    }
}

/// Build the filter: `RUST_LOG` wins, then `level`, then `info`
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(normalize_level(level)))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// One JSON object per event, for log files read by tools
fn json_file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
}

/// Initialize logging to stdout and, optionally, an append-mode JSON log file
pub fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| anyhow::anyhow!("Failed to open log file {:?}: {}", path, e))?;
            Some(json_file_layer(file))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    Ok(())
}
