//! Bar types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV price bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    /// Trading symbol (e.g., "AAPL")
    pub symbol: String,
    /// Opening price
    pub open: Decimal,
    /// Highest traded price
    pub high: Decimal,
    /// Lowest traded price
    pub low: Decimal,
    /// Closing price
    pub close: Decimal,
    /// Traded volume
    pub volume: Decimal,
}

impl Bar {
    /// Create a new bar
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: impl Into<String>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar where open, high, low and close are all `price`
    pub fn flat(
        timestamp: DateTime<Utc>,
        symbol: impl Into<String>,
        price: Decimal,
        volume: Decimal,
    ) -> Self {
        Self::new(timestamp, symbol, price, price, price, price, volume)
    }

    /// Typical price: (high + low + close) / 3
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_flat_bar() {
        let bar = Bar::flat(Utc::now(), "AAPL", dec!(150), dec!(1000));
        assert_eq!(bar.open, dec!(150));
        assert_eq!(bar.high, dec!(150));
        assert_eq!(bar.low, dec!(150));
        assert_eq!(bar.close, dec!(150));
        assert_eq!(bar.symbol, "AAPL");
    }

    #[test]
    fn test_typical_price() {
        let bar = Bar::new(
            Utc::now(),
            "MSFT",
            dec!(100),
            dec!(110),
            dec!(90),
            dec!(100),
            dec!(10),
        );
        assert_eq!(bar.typical_price(), dec!(100));
    }

    #[test]
    fn test_bar_serde() {
        let bar = Bar::flat(Utc::now(), "AAPL", dec!(1.5), dec!(2));
        let json = serde_json::to_string(&bar).unwrap();
        let back: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, back);
    }
}
