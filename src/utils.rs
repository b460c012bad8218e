//! Common helpers: symbol validation, timestamps, returns, resampling

use crate::market::{Bar, ParseTimeframeError, Timeframe};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum length of a ticker symbol
pub const MAX_SYMBOL_LEN: usize = 5;

/// Utility errors
#[derive(Debug, Error)]
pub enum UtilError {
    /// Timestamp string not in a supported format
    #[error("Failed to parse timestamp: {0}")]
    InvalidTimestamp(String),
    /// Timeframe string not valid
    #[error(transparent)]
    InvalidTimeframe(#[from] ParseTimeframeError),
}

/// Check that a symbol is 1-5 ASCII letters (case-insensitive)
pub fn validate_symbol(symbol: &str) -> bool {
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol.chars().all(|c| c.is_ascii_alphabetic());

    if !valid {
        tracing::warn!(symbol, "Invalid symbol format");
    }

    valid
}

/// Format a timestamp as RFC 3339 with microsecond precision
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp string
///
/// Accepts RFC 3339 and naive `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or
/// `YYYY-MM-DDTHH:MM:SS` forms, which are taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, UtilError> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(naive) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    Err(UtilError::InvalidTimestamp(s.to_string()))
}

/// Simple returns between consecutive prices
///
/// Returns `n - 1` values for `n` prices. A return after a zero price is
/// `None` since it cannot be computed.
pub fn calculate_returns(prices: &[Decimal]) -> Vec<Option<Decimal>> {
    prices
        .windows(2)
        .map(|w| {
            if w[0].is_zero() {
                None
            } else {
                Some((w[1] - w[0]) / w[0])
            }
        })
        .collect()
}

/// Logarithmic returns between consecutive prices
///
/// A log return involving a non-positive price is `None`.
pub fn calculate_log_returns(prices: &[Decimal]) -> Vec<Option<f64>> {
    prices
        .windows(2)
        .map(|w| {
            let prev = w[0].to_f64()?;
            let curr = w[1].to_f64()?;
            if prev > 0.0 && curr > 0.0 {
                Some((curr / prev).ln())
            } else {
                None
            }
        })
        .collect()
}

/// Resample bars into a coarser timeframe
///
/// Buckets are aligned to the Unix epoch. Each symbol is aggregated
/// separately: first open, max high, min low, last close, summed volume.
/// Output is ordered by bucket start, then symbol.
pub fn resample_ohlc(bars: &[Bar], timeframe: Timeframe) -> Vec<Bar> {
    let bucket_secs = timeframe.as_secs() as i64;
    let mut buckets: BTreeMap<(i64, String), Bar> = BTreeMap::new();

    for bar in bars {
        let start = bar.timestamp.timestamp().div_euclid(bucket_secs) * bucket_secs;
        let Some(bucket_ts) = Utc.timestamp_opt(start, 0).single() else {
            continue;
        };

        buckets
            .entry((start, bar.symbol.clone()))
            .and_modify(|agg| {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            })
            .or_insert_with(|| Bar {
                timestamp: bucket_ts,
                ..bar.clone()
            });
    }

    buckets.into_values().collect()
}

/// Parse a timeframe string such as `5m` into seconds
pub fn parse_timeframe(timeframe: &str) -> Result<u64, UtilError> {
    let parsed: Timeframe = timeframe.parse().inspect_err(|e| {
        tracing::error!(timeframe, error = %e, "Invalid timeframe");
    })?;
    Ok(parsed.as_secs())
}

/// Divide, returning `default` when the denominator is zero or the
/// result is not finite
pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || denominator.is_nan() {
        return default;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_safe_divide() {
        assert_eq!(safe_divide(6.0, 3.0, 0.0), 2.0);
        assert_eq!(safe_divide(5.0, 0.0, -1.0), -1.0);
        assert_eq!(safe_divide(-7.5, 0.0, 42.0), 42.0);
        assert_eq!(safe_divide(1.0, f64::NAN, 3.0), 3.0);
    }

    #[test]
    fn test_parse_timeframe() {
        assert_eq!(parse_timeframe("5m").unwrap(), 300);
        assert_eq!(parse_timeframe("1h").unwrap(), 3600);
        assert_eq!(parse_timeframe("1d").unwrap(), 86400);
        assert!(parse_timeframe("bogus").is_err());
    }

    #[test]
    fn test_validate_symbol() {
        assert!(validate_symbol("AAPL"));
        assert!(validate_symbol("msft"));
        assert!(validate_symbol("F"));
        assert!(!validate_symbol("toolong123"));
        assert!(!validate_symbol("GOOGLE"));
        assert!(!validate_symbol(""));
        assert!(!validate_symbol("BRK.B"));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 5).unwrap()
            + Duration::microseconds(123_456);
        let formatted = format_timestamp(&ts);
        assert_eq!(formatted, "2024-03-15T14:30:05.123456Z");
        assert_eq!(parse_timestamp(&formatted).unwrap(), ts);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02 00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02T00:00:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2024-01-02T01:00:00+01:00").unwrap(),
            expected
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_calculate_returns() {
        let returns = calculate_returns(&[dec!(100), dec!(110), dec!(99)]);
        assert_eq!(returns, vec![Some(dec!(0.1)), Some(dec!(-0.1))]);
        assert!(calculate_returns(&[dec!(100)]).is_empty());
        assert_eq!(calculate_returns(&[dec!(0), dec!(1)]), vec![None]);
    }

    #[test]
    fn test_calculate_log_returns() {
        let returns = calculate_log_returns(&[dec!(100), dec!(200)]);
        assert_eq!(returns.len(), 1);
        assert!((returns[0].unwrap() - 2f64.ln()).abs() < 1e-12);
        assert!(calculate_log_returns(&[]).is_empty());
        assert_eq!(calculate_log_returns(&[dec!(-1), dec!(1)]), vec![None]);
    }

    #[test]
    fn test_resample_ohlc() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap();
        let bars: Vec<Bar> = (0..10)
            .map(|i| {
                let price = Decimal::from(100 + i);
                Bar::new(
                    base + Duration::minutes(i),
                    "AAPL",
                    price,
                    price + dec!(1),
                    price - dec!(1),
                    price,
                    dec!(10),
                )
            })
            .collect();

        let resampled = resample_ohlc(&bars, "5m".parse().unwrap());
        assert_eq!(resampled.len(), 2);

        let first = &resampled[0];
        assert_eq!(first.timestamp, base);
        assert_eq!(first.open, dec!(100));
        assert_eq!(first.high, dec!(105));
        assert_eq!(first.low, dec!(99));
        assert_eq!(first.close, dec!(104));
        assert_eq!(first.volume, dec!(50));

        assert_eq!(resampled[1].timestamp, base + Duration::minutes(5));
        assert_eq!(resampled[1].close, dec!(109));
    }

    #[test]
    fn test_resample_keeps_symbols_apart() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let bars = vec![
            Bar::flat(base, "AAPL", dec!(10), dec!(1)),
            Bar::flat(base, "MSFT", dec!(20), dec!(2)),
            Bar::flat(base + Duration::minutes(1), "AAPL", dec!(11), dec!(1)),
        ];
        let resampled = resample_ohlc(&bars, "1h".parse().unwrap());
        assert_eq!(resampled.len(), 2);
        assert_eq!(resampled[0].symbol, "AAPL");
        assert_eq!(resampled[0].close, dec!(11));
        assert_eq!(resampled[1].symbol, "MSFT");
        assert_eq!(resampled[1].volume, dec!(2));
    }
}
