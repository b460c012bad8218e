//! Strategy interface driven by the backtester

use crate::indicators::{IndicatorSnapshot, IndicatorSpec};
use crate::market::Bar;
use crate::signal::Signal;

/// Produces one signal per bar
///
/// Closures `FnMut(&Bar, &IndicatorSnapshot) -> Signal` are strategies.
pub trait Strategy {
    /// Decide for `bar` given the indicators computed up to and including it
    fn on_bar(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) -> Signal;

    /// Indicators this strategy reads, computed in addition to the
    /// backtest's configured ones
    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        Vec::new()
    }

    /// Called before each run
    fn reset(&mut self) {}
}

impl<F> Strategy for F
where
    F: FnMut(&Bar, &IndicatorSnapshot) -> Signal,
{
    fn on_bar(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) -> Signal {
        self(bar, indicators)
    }
}
