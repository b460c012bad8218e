//! Signal generator: applies a rule, sizes positions and keeps history

use super::rules::{rule_by_name, SignalRule};
use super::types::{Signal, SignalError, SignalType};
use crate::backtest::Strategy;
use crate::indicators::{IndicatorSnapshot, IndicatorSpec};
use crate::market::Bar;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Signals kept before the oldest are dropped
pub const DEFAULT_MAX_HISTORY: usize = 10_000;

/// Generates trading signals from bars and indicators
pub struct SignalGenerator {
    strategy_name: String,
    rule: Box<dyn SignalRule>,
    history: VecDeque<Signal>,
    max_history: usize,
}

impl SignalGenerator {
    /// Create a generator for a registered strategy name
    pub fn new(strategy_name: &str) -> Result<Self, SignalError> {
        let rule = rule_by_name(strategy_name)?;
        Ok(Self::with_rule(strategy_name, rule))
    }

    /// Create a generator around any rule
    pub fn with_rule(strategy_name: impl Into<String>, rule: Box<dyn SignalRule>) -> Self {
        let strategy_name = strategy_name.into();
        tracing::info!(strategy = %strategy_name, "SignalGenerator initialized");
        Self {
            strategy_name,
            rule,
            history: VecDeque::new(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Cap the number of signals kept
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max.max(1);
        self
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// Indicators the rule expects in its snapshot
    pub fn required_indicators(&self) -> Vec<IndicatorSpec> {
        self.rule.required_indicators()
    }

    /// Generate and record a signal for `symbol` at `bar`
    pub fn generate_signal(
        &mut self,
        symbol: &str,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
    ) -> Signal {
        let decision = self.rule.evaluate(bar, indicators);
        let signal = Signal::new(symbol, decision.signal, decision.confidence, bar.timestamp)
            .with_metadata(self.strategy_name.clone(), decision.note);

        tracing::debug!(
            symbol,
            signal = %signal.signal,
            confidence = %signal.confidence,
            "Generated signal"
        );

        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(signal.clone());
        signal
    }

    /// Whether the rule can act on these indicators
    pub fn evaluate_conditions(&self, indicators: &IndicatorSnapshot) -> bool {
        self.rule.conditions_met(indicators)
    }

    /// Dollar amount to commit to a signal
    ///
    /// `portfolio_value * risk_per_trade * confidence` for buys and sells,
    /// zero for anything else.
    pub fn calculate_position_size(
        &self,
        signal: &Signal,
        portfolio_value: Decimal,
        risk_per_trade: Decimal,
    ) -> Decimal {
        if !signal.signal.is_directional() || portfolio_value <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (portfolio_value * risk_per_trade * signal.confidence).max(Decimal::ZERO)
    }

    /// Most recent signals, oldest first, optionally for one symbol
    pub fn get_signal_history(&self, symbol: Option<&str>, limit: usize) -> Vec<&Signal> {
        let mut recent: Vec<&Signal> = self
            .history
            .iter()
            .rev()
            .filter(|s| symbol.map_or(true, |sym| s.symbol == sym))
            .take(limit)
            .collect();
        recent.reverse();
        recent
    }

    /// Clear recorded signals
    pub fn reset_history(&mut self) {
        tracing::info!(strategy = %self.strategy_name, "Resetting signal history");
        self.history.clear();
    }
}

impl Strategy for SignalGenerator {
    fn on_bar(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) -> Signal {
        self.generate_signal(&bar.symbol, bar, indicators)
    }

    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        self.rule.required_indicators()
    }

    fn reset(&mut self) {
        self.rule.reset();
        self.history.clear();
    }
}
