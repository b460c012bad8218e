//! Backtesting module
//!
//! Replays historical bars through a strategy with simulated fills,
//! commission and slippage

mod analytics;
mod engine;
mod portfolio;
mod strategy;
mod types;

pub use analytics::{max_drawdown, sharpe_ratio, BacktestResult, MetricsConfig, PerformanceMetrics};
pub use engine::{BacktestConfig, BacktestOutcome, Backtester};
pub use portfolio::Portfolio;
pub use strategy::Strategy;
pub use types::{PortfolioSnapshot, Position, Trade, TradeAction};

use crate::data::DataError;
use crate::indicators::IndicatorError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Backtest errors
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Bars out of order at index {index}: {current} follows {previous}")]
    NonChronological {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Duplicate bar for {symbol} at {timestamp}")]
    DuplicateBar {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(Decimal),

    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),

    #[error("Insufficient cash: required {required}, available {available}")]
    InsufficientCash { required: Decimal, available: Decimal },

    #[error("Insufficient position in {symbol}: requested {requested}, held {held}")]
    InsufficientPosition {
        symbol: String,
        requested: Decimal,
        held: Decimal,
    },

    #[error("Invalid backtest configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}
