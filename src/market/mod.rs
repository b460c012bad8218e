//! Market data types
//!
//! OHLCV bars and bar timeframes shared by the stream, indicator,
//! signal and backtest modules

mod timeframe;
mod types;

pub use timeframe::{ParseTimeframeError, Timeframe};
pub use types::Bar;
