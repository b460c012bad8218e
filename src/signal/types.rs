//! Signal types

use crate::indicators::IndicatorError;
use crate::market::Bar;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Direction of a trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
    Neutral,
}

impl SignalType {
    /// Whether the signal asks for a trade
    pub fn is_directional(self) -> bool {
        matches!(self, SignalType::Buy | SignalType::Sell)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
            SignalType::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// Where a signal came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Strategy name
    pub strategy: String,
    /// Free-form explanation
    pub note: String,
}

/// A trading signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique signal identifier
    pub id: Uuid,
    pub symbol: String,
    pub signal: SignalType,
    /// Confidence in `[0, 1]`
    pub confidence: Decimal,
    pub timestamp: DateTime<Utc>,
    pub metadata: SignalMetadata,
}

impl Signal {
    /// Create a signal; confidence is clamped to `[0, 1]`
    pub fn new(
        symbol: impl Into<String>,
        signal: SignalType,
        confidence: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            signal,
            confidence: confidence.clamp(Decimal::ZERO, Decimal::ONE),
            timestamp,
            metadata: SignalMetadata::default(),
        }
    }

    /// Signal for the bar's symbol at the bar's timestamp
    pub fn for_bar(bar: &Bar, signal: SignalType, confidence: Decimal) -> Self {
        Self::new(bar.symbol.clone(), signal, confidence, bar.timestamp)
    }

    /// Attach metadata
    pub fn with_metadata(mut self, strategy: impl Into<String>, note: impl Into<String>) -> Self {
        self.metadata = SignalMetadata {
            strategy: strategy.into(),
            note: note.into(),
        };
        self
    }
}

/// Signal generation errors
#[derive(Debug, Error)]
pub enum SignalError {
    /// No rule registered under the name
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    /// Rule parameters invalid
    #[error("Invalid rule parameters: {0}")]
    InvalidParameters(String),
    /// Indicator spec invalid
    #[error(transparent)]
    Indicator(#[from] IndicatorError),
}
