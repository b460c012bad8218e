//! Technical indicators
//!
//! SMA, EMA, RSI, MACD, Bollinger bands and volume profile over `Decimal`
//! prices, plus batch calculation keyed by named [`IndicatorSpec`]s.

mod calculator;
mod types;

pub use calculator::IndicatorCalculator;
pub use types::{
    BollingerBands, IndicatorError, IndicatorFrame, IndicatorSnapshot, IndicatorSpec, MacdSeries,
    VolumeLevel, VolumeProfile,
};
