//! Metrics published through the `metrics` facade
//!
//! Nothing is exported unless the binary installs a recorder; without one
//! the calls are no-ops.

use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Time spent dispatching one stream message to subscribers
    StreamDispatch,
    /// Time spent computing indicators for one bar
    IndicatorCalculation,
    /// Time spent running a full backtest
    BacktestRun,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// Cash balance
    Cash,
    /// Open position count
    OpenPositions,
    /// Current drawdown from peak
    DrawdownPct,
    /// Active stream subscribers
    Subscribers,
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Stream frames decoded into events
    StreamMessages,
    /// Stream frames that failed to decode
    StreamDecodeErrors,
    /// Subscriber handler failures
    SubscriberFailures,
    /// Simulated trades executed
    TradesExecuted,
}

impl LatencyMetric {
    fn name(self) -> &'static str {
        match self {
            LatencyMetric::StreamDispatch => "rtinv_stream_dispatch_latency_ms",
            LatencyMetric::IndicatorCalculation => "rtinv_indicator_latency_ms",
            LatencyMetric::BacktestRun => "rtinv_backtest_run_latency_ms",
        }
    }
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "rtinv_equity_usd",
            GaugeMetric::Cash => "rtinv_cash_usd",
            GaugeMetric::OpenPositions => "rtinv_open_positions",
            GaugeMetric::DrawdownPct => "rtinv_drawdown_pct",
            GaugeMetric::Subscribers => "rtinv_stream_subscribers",
        }
    }
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::StreamMessages => "rtinv_stream_messages_total",
            CounterMetric::StreamDecodeErrors => "rtinv_stream_decode_errors_total",
            CounterMetric::SubscriberFailures => "rtinv_subscriber_failures_total",
            CounterMetric::TradesExecuted => "rtinv_trades_executed_total",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    ::metrics::histogram!(metric.name()).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter
pub fn increment(metric: CounterMetric, by: u64) {
    ::metrics::counter!(metric.name()).increment(by);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            LatencyMetric::StreamDispatch.name(),
            GaugeMetric::Equity.name(),
            CounterMetric::TradesExecuted.name(),
        ] {
            assert!(name.starts_with("rtinv_"));
        }
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_latency(LatencyMetric::BacktestRun, Duration::from_millis(5));
        set_gauge(GaugeMetric::Cash, 1.0);
        increment(CounterMetric::StreamMessages, 1);
    }
}
