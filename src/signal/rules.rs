//! Signal rules
//!
//! A rule turns a bar plus its indicator snapshot into a direction and a
//! confidence. Rules may keep per-symbol state between bars.

use super::types::{SignalError, SignalType};
use crate::indicators::{IndicatorSnapshot, IndicatorSpec};
use crate::market::Bar;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Output of a rule for one bar
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecision {
    pub signal: SignalType,
    pub confidence: Decimal,
    pub note: String,
}

impl RuleDecision {
    pub fn new(signal: SignalType, confidence: Decimal, note: impl Into<String>) -> Self {
        Self {
            signal,
            confidence,
            note: note.into(),
        }
    }
}

/// Decision logic behind a [`SignalGenerator`](super::SignalGenerator)
pub trait SignalRule: Send {
    /// Indicators the rule reads from the snapshot
    fn required_indicators(&self) -> Vec<IndicatorSpec>;

    /// Decide for one bar
    fn evaluate(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) -> RuleDecision;

    /// Whether the snapshot holds what the rule needs and points in a
    /// direction
    fn conditions_met(&self, indicators: &IndicatorSnapshot) -> bool;

    /// Forget per-symbol state
    fn reset(&mut self) {}
}

/// Always neutral
#[derive(Debug, Clone, Default)]
pub struct NeutralRule;

impl SignalRule for NeutralRule {
    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        Vec::new()
    }

    fn evaluate(&mut self, _bar: &Bar, _indicators: &IndicatorSnapshot) -> RuleDecision {
        RuleDecision::new(SignalType::Neutral, Decimal::ZERO, "no strategy logic")
    }

    fn conditions_met(&self, _indicators: &IndicatorSnapshot) -> bool {
        false
    }
}

/// Moving-average crossover
///
/// Buys when the fast SMA crosses above the slow SMA and sells when it
/// crosses below. Bars without a crossing hold.
#[derive(Debug, Clone)]
pub struct SmaCrossoverRule {
    fast: IndicatorSpec,
    slow: IndicatorSpec,
    fast_key: String,
    slow_key: String,
    /// Last observed `fast > slow` per symbol
    above: HashMap<String, bool>,
}

impl SmaCrossoverRule {
    pub const DEFAULT_FAST: usize = 20;
    pub const DEFAULT_SLOW: usize = 50;

    pub fn new(fast: usize, slow: usize) -> Result<Self, SignalError> {
        if fast >= slow {
            return Err(SignalError::InvalidParameters(format!(
                "fast period {fast} must be below slow period {slow}"
            )));
        }
        let fast = IndicatorSpec::Sma { period: fast };
        let slow = IndicatorSpec::Sma { period: slow };
        fast.validate()?;
        slow.validate()?;

        Ok(Self {
            fast_key: fast.to_string(),
            slow_key: slow.to_string(),
            fast,
            slow,
            above: HashMap::new(),
        })
    }

    fn averages(&self, indicators: &IndicatorSnapshot) -> Option<(Decimal, Decimal)> {
        Some((indicators.get(&self.fast_key)?, indicators.get(&self.slow_key)?))
    }
}

impl Default for SmaCrossoverRule {
    fn default() -> Self {
        Self {
            fast: IndicatorSpec::Sma {
                period: Self::DEFAULT_FAST,
            },
            slow: IndicatorSpec::Sma {
                period: Self::DEFAULT_SLOW,
            },
            fast_key: format!("sma_{}", Self::DEFAULT_FAST),
            slow_key: format!("sma_{}", Self::DEFAULT_SLOW),
            above: HashMap::new(),
        }
    }
}

impl SignalRule for SmaCrossoverRule {
    fn required_indicators(&self) -> Vec<IndicatorSpec> {
        vec![self.fast.clone(), self.slow.clone()]
    }

    fn evaluate(&mut self, bar: &Bar, indicators: &IndicatorSnapshot) -> RuleDecision {
        let Some((fast, slow)) = self.averages(indicators) else {
            return RuleDecision::new(SignalType::Hold, Decimal::ZERO, "warming up");
        };

        if fast == slow {
            return RuleDecision::new(SignalType::Hold, Decimal::ZERO, "averages equal");
        }

        let above = fast > slow;
        match self.above.insert(bar.symbol.clone(), above) {
            Some(false) if above => RuleDecision::new(
                SignalType::Buy,
                Decimal::ONE,
                format!("{} crossed above {}", self.fast_key, self.slow_key),
            ),
            Some(true) if !above => RuleDecision::new(
                SignalType::Sell,
                Decimal::ONE,
                format!("{} crossed below {}", self.fast_key, self.slow_key),
            ),
            _ => RuleDecision::new(SignalType::Hold, Decimal::ZERO, "no crossing"),
        }
    }

    fn conditions_met(&self, indicators: &IndicatorSnapshot) -> bool {
        self.averages(indicators)
            .is_some_and(|(fast, slow)| fast != slow)
    }

    fn reset(&mut self) {
        self.above.clear();
    }
}

/// Build a rule from its registered name
///
/// `placeholder` and `neutral` never trade. `sma_crossover` uses 20/50
/// periods; `sma_crossover_<fast>_<slow>` sets them explicitly.
pub fn rule_by_name(name: &str) -> Result<Box<dyn SignalRule>, SignalError> {
    let lower = name.trim().to_ascii_lowercase();

    match lower.as_str() {
        "placeholder" | "neutral" => return Ok(Box::new(NeutralRule)),
        "sma_crossover" => return Ok(Box::new(SmaCrossoverRule::default())),
        _ => {}
    }

    if let Some(periods) = lower.strip_prefix("sma_crossover_") {
        let parsed: Option<Vec<usize>> = periods.split('_').map(|p| p.parse().ok()).collect();
        if let Some([fast, slow]) = parsed.as_deref() {
            return Ok(Box::new(SmaCrossoverRule::new(*fast, *slow)?));
        }
    }

    Err(SignalError::UnknownStrategy(name.to_string()))
}
