//! Indicator specifications and result types

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Indicator errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndicatorError {
    /// Period of zero or otherwise unusable
    #[error("Invalid period for {indicator}: {period}")]
    InvalidPeriod { indicator: &'static str, period: usize },
    /// Parameter outside its allowed range
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Indicator name not recognized
    #[error("Unknown indicator spec: {0}")]
    UnknownSpec(String),
    /// Batch input covers more than one symbol
    #[error("Bars cover more than one symbol: {0} and {1}")]
    MixedSymbols(String, String),
}

/// A named indicator with its parameters
///
/// Parsed from names such as `sma_20`, `ema_12`, `rsi_14`, `macd_12_26_9`
/// and `bb_20_2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndicatorSpec {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    Bollinger { period: usize, num_std: Decimal },
}

impl IndicatorSpec {
    /// Check parameters
    pub fn validate(&self) -> Result<(), IndicatorError> {
        let check = |indicator, period: usize| {
            if period == 0 {
                Err(IndicatorError::InvalidPeriod { indicator, period })
            } else {
                Ok(())
            }
        };

        match *self {
            IndicatorSpec::Sma { period } => check("sma", period),
            IndicatorSpec::Ema { period } => check("ema", period),
            IndicatorSpec::Rsi { period } => check("rsi", period),
            IndicatorSpec::Macd { fast, slow, signal } => {
                check("macd", fast)?;
                check("macd", slow)?;
                check("macd", signal)?;
                if fast >= slow {
                    return Err(IndicatorError::InvalidParameter(format!(
                        "macd fast period {fast} must be below slow period {slow}"
                    )));
                }
                Ok(())
            }
            IndicatorSpec::Bollinger { period, num_std } => {
                check("bollinger", period)?;
                if num_std <= Decimal::ZERO {
                    return Err(IndicatorError::InvalidParameter(format!(
                        "bollinger std multiplier must be positive, got {num_std}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Bars needed before every output of this indicator is defined
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorSpec::Sma { period } | IndicatorSpec::Bollinger { period, .. } => period,
            IndicatorSpec::Rsi { period } => period + 1,
            IndicatorSpec::Ema { .. } | IndicatorSpec::Macd { .. } => 1,
        }
    }

    /// Column names this indicator produces
    pub fn output_keys(&self) -> Vec<String> {
        let name = self.to_string();
        match self {
            IndicatorSpec::Macd { .. } => {
                let signal = format!("{name}_signal");
                let hist = format!("{name}_hist");
                vec![name, signal, hist]
            }
            IndicatorSpec::Bollinger { .. } => vec![
                format!("{name}_upper"),
                format!("{name}_middle"),
                format!("{name}_lower"),
            ],
            _ => vec![name],
        }
    }
}

impl fmt::Display for IndicatorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorSpec::Sma { period } => write!(f, "sma_{period}"),
            IndicatorSpec::Ema { period } => write!(f, "ema_{period}"),
            IndicatorSpec::Rsi { period } => write!(f, "rsi_{period}"),
            IndicatorSpec::Macd { fast, slow, signal } => write!(f, "macd_{fast}_{slow}_{signal}"),
            IndicatorSpec::Bollinger { period, num_std } => {
                write!(f, "bb_{period}_{}", num_std.normalize())
            }
        }
    }
}

impl FromStr for IndicatorSpec {
    type Err = IndicatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let mut parts = lower.split('_');
        let kind = parts.next().unwrap_or_default();
        let params: Vec<&str> = parts.collect();
        let unknown = || IndicatorError::UnknownSpec(s.to_string());

        let period = |i: usize| -> Result<usize, IndicatorError> {
            params.get(i).and_then(|p| p.parse().ok()).ok_or_else(unknown)
        };

        let spec = match (kind, params.len()) {
            ("sma", 1) => IndicatorSpec::Sma { period: period(0)? },
            ("ema", 1) => IndicatorSpec::Ema { period: period(0)? },
            ("rsi", 1) => IndicatorSpec::Rsi { period: period(0)? },
            ("macd", 3) => IndicatorSpec::Macd {
                fast: period(0)?,
                slow: period(1)?,
                signal: period(2)?,
            },
            ("bb", 2) => IndicatorSpec::Bollinger {
                period: period(0)?,
                num_std: params[1].parse().map_err(|_| unknown())?,
            },
            _ => return Err(unknown()),
        };

        spec.validate()?;
        Ok(spec)
    }
}

/// MACD output series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacdSeries {
    pub macd: Vec<Option<Decimal>>,
    pub signal: Vec<Option<Decimal>>,
    pub histogram: Vec<Option<Decimal>>,
}

/// Bollinger band series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BollingerBands {
    pub upper: Vec<Option<Decimal>>,
    pub middle: Vec<Option<Decimal>>,
    pub lower: Vec<Option<Decimal>>,
}

/// Volume traded inside one price bin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeLevel {
    pub price_low: Decimal,
    pub price_high: Decimal,
    pub volume: Decimal,
}

impl VolumeLevel {
    /// Bin midpoint
    pub fn midpoint(&self) -> Decimal {
        (self.price_low + self.price_high) / Decimal::TWO
    }
}

/// Volume distribution over price
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VolumeProfile {
    /// Bins from lowest to highest price
    pub levels: Vec<VolumeLevel>,
    /// Midpoint of the bin with the most volume
    pub point_of_control: Option<Decimal>,
    pub total_volume: Decimal,
}

/// Latest indicator values, keyed by output name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndicatorSnapshot {
    values: BTreeMap<String, Decimal>,
}

impl IndicatorSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Decimal) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Decimal> {
        self.values.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, Decimal)> for IndicatorSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, Decimal)>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for (k, v) in iter {
            snapshot.insert(k, v);
        }
        snapshot
    }
}

/// Named indicator columns aligned with an input series
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndicatorFrame {
    len: usize,
    columns: BTreeMap<String, Vec<Option<Decimal>>>,
}

impl IndicatorFrame {
    /// Empty frame for `len` rows
    pub fn new(len: usize) -> Self {
        Self {
            len,
            columns: BTreeMap::new(),
        }
    }

    /// Add a column; it must have one value per row
    pub fn insert(&mut self, name: impl Into<String>, column: Vec<Option<Decimal>>) {
        debug_assert_eq!(column.len(), self.len);
        self.columns.insert(name.into(), column);
    }

    /// Row count
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Column by name
    pub fn column(&self, name: &str) -> Option<&[Option<Decimal>]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Column names in sorted order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Defined values at `row`
    pub fn snapshot(&self, row: usize) -> IndicatorSnapshot {
        self.columns
            .iter()
            .filter_map(|(name, col)| col.get(row).copied().flatten().map(|v| (name.clone(), v)))
            .collect()
    }

    /// Defined values at the last row
    pub fn latest(&self) -> IndicatorSnapshot {
        match self.len {
            0 => IndicatorSnapshot::new(),
            n => self.snapshot(n - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_specs() {
        assert_eq!("sma_20".parse::<IndicatorSpec>(), Ok(IndicatorSpec::Sma { period: 20 }));
        assert_eq!("EMA_12".parse::<IndicatorSpec>(), Ok(IndicatorSpec::Ema { period: 12 }));
        assert_eq!("rsi_14".parse::<IndicatorSpec>(), Ok(IndicatorSpec::Rsi { period: 14 }));
        assert_eq!(
            "macd_12_26_9".parse::<IndicatorSpec>(),
            Ok(IndicatorSpec::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            })
        );
        assert_eq!(
            "bb_20_2.5".parse::<IndicatorSpec>(),
            Ok(IndicatorSpec::Bollinger {
                period: 20,
                num_std: dec!(2.5)
            })
        );
    }

    #[test]
    fn test_parse_rejects_bad_specs() {
        assert!(matches!(
            "sma_0".parse::<IndicatorSpec>(),
            Err(IndicatorError::InvalidPeriod { .. })
        ));
        assert!(matches!(
            "macd_26_12_9".parse::<IndicatorSpec>(),
            Err(IndicatorError::InvalidParameter(_))
        ));
        assert!(matches!(
            "bb_20_0".parse::<IndicatorSpec>(),
            Err(IndicatorError::InvalidParameter(_))
        ));
        for bad in ["", "sma", "sma_x", "vwap_10", "rsi_14_2"] {
            assert!(
                matches!(bad.parse::<IndicatorSpec>(), Err(IndicatorError::UnknownSpec(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_display_round_trips_names() {
        for name in ["sma_20", "ema_12", "rsi_14", "macd_12_26_9", "bb_20_2"] {
            let spec: IndicatorSpec = name.parse().unwrap();
            assert_eq!(spec.to_string(), name);
        }
    }

    #[test]
    fn test_output_keys() {
        let macd: IndicatorSpec = "macd_12_26_9".parse().unwrap();
        assert_eq!(
            macd.output_keys(),
            vec!["macd_12_26_9", "macd_12_26_9_signal", "macd_12_26_9_hist"]
        );
        let bb: IndicatorSpec = "bb_20_2".parse().unwrap();
        assert_eq!(bb.output_keys()[1], "bb_20_2_middle");
    }

    #[test]
    fn test_frame_snapshot_skips_undefined() {
        let mut frame = IndicatorFrame::new(2);
        frame.insert("sma_2", vec![None, Some(dec!(1.5))]);
        frame.insert("ema_2", vec![Some(dec!(1)), Some(dec!(1.66))]);

        let first = frame.snapshot(0);
        assert_eq!(first.len(), 1);
        assert_eq!(first.get("ema_2"), Some(dec!(1)));
        assert!(!first.contains("sma_2"));

        assert_eq!(frame.latest().get("sma_2"), Some(dec!(1.5)));
        assert!(IndicatorFrame::new(0).latest().is_empty());
    }
}
