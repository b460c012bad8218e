//! Technical indicator calculations over `Decimal` price series
//!
//! Every series has the same length as its input. `None` marks positions
//! where the indicator is not yet defined.

use super::types::{
    BollingerBands, IndicatorError, IndicatorFrame, IndicatorSpec, MacdSeries, VolumeLevel,
    VolumeProfile,
};
use crate::market::Bar;
use crate::telemetry::{self, LatencyMetric};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use std::time::Instant;

/// Computes technical indicators from price data
#[derive(Debug, Clone, Default)]
pub struct IndicatorCalculator;

fn check_period(indicator: &'static str, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod { indicator, period });
    }
    Ok(())
}

fn combine(
    a: &[Option<Decimal>],
    b: &[Option<Decimal>],
    f: impl Fn(Decimal, Decimal) -> Decimal,
) -> Vec<Option<Decimal>> {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => Some(f(*x, *y)),
            _ => None,
        })
        .collect()
}

impl IndicatorCalculator {
    pub fn new() -> Self {
        tracing::debug!("IndicatorCalculator initialized");
        Self
    }

    /// Simple moving average over `period` values
    pub fn calculate_sma(
        &self,
        data: &[Decimal],
        period: usize,
    ) -> Result<Vec<Option<Decimal>>, IndicatorError> {
        check_period("sma", period)?;
        tracing::trace!(period, len = data.len(), "Calculating SMA");

        let divisor = Decimal::from(period);
        let mut out = Vec::with_capacity(data.len());
        let mut sum = Decimal::ZERO;

        for (i, value) in data.iter().enumerate() {
            sum += value;
            if i >= period {
                sum -= data[i - period];
            }
            out.push((i + 1 >= period).then(|| sum / divisor));
        }

        Ok(out)
    }

    /// Exponential moving average
    ///
    /// `alpha = 2 / (period + 1)`, seeded with the first value, so every
    /// position is defined.
    pub fn calculate_ema(
        &self,
        data: &[Decimal],
        period: usize,
    ) -> Result<Vec<Option<Decimal>>, IndicatorError> {
        check_period("ema", period)?;
        tracing::trace!(period, len = data.len(), "Calculating EMA");
        Ok(ema(data, period).into_iter().map(Some).collect())
    }

    /// Relative strength index with Wilder smoothing
    ///
    /// The first value is at index `period`. A window without any movement
    /// reads 50; one without losses reads 100.
    pub fn calculate_rsi(
        &self,
        data: &[Decimal],
        period: usize,
    ) -> Result<Vec<Option<Decimal>>, IndicatorError> {
        check_period("rsi", period)?;
        tracing::trace!(period, len = data.len(), "Calculating RSI");

        let mut out = vec![None; data.len()];
        if data.len() <= period {
            return Ok(out);
        }

        let n = Decimal::from(period);
        let (mut avg_gain, mut avg_loss) = (Decimal::ZERO, Decimal::ZERO);

        for i in 1..data.len() {
            let change = data[i] - data[i - 1];
            let gain = change.max(Decimal::ZERO);
            let loss = (-change).max(Decimal::ZERO);

            if i <= period {
                avg_gain += gain / n;
                avg_loss += loss / n;
                if i < period {
                    continue;
                }
            } else {
                avg_gain = (avg_gain * (n - Decimal::ONE) + gain) / n;
                avg_loss = (avg_loss * (n - Decimal::ONE) + loss) / n;
            }

            out[i] = Some(rsi_value(avg_gain, avg_loss));
        }

        Ok(out)
    }

    /// MACD line, signal line and histogram
    pub fn calculate_macd(
        &self,
        data: &[Decimal],
        fast: usize,
        slow: usize,
        signal: usize,
    ) -> Result<MacdSeries, IndicatorError> {
        IndicatorSpec::Macd { fast, slow, signal }.validate()?;
        tracing::trace!(fast, slow, signal, len = data.len(), "Calculating MACD");

        let fast_ema = ema(data, fast);
        let slow_ema = ema(data, slow);
        let macd: Vec<Decimal> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
        let signal_line = ema(&macd, signal);
        let histogram = macd
            .iter()
            .zip(&signal_line)
            .map(|(m, s)| Some(m - s))
            .collect();

        Ok(MacdSeries {
            macd: macd.into_iter().map(Some).collect(),
            signal: signal_line.into_iter().map(Some).collect(),
            histogram,
        })
    }

    /// Bollinger bands: SMA middle band, `num_std` population standard
    /// deviations either side
    pub fn calculate_bollinger_bands(
        &self,
        data: &[Decimal],
        period: usize,
        num_std: Decimal,
    ) -> Result<BollingerBands, IndicatorError> {
        IndicatorSpec::Bollinger { period, num_std }.validate()?;
        tracing::trace!(period, %num_std, len = data.len(), "Calculating Bollinger bands");

        let middle = self.calculate_sma(data, period)?;
        let divisor = Decimal::from(period);
        let mut upper = vec![None; data.len()];
        let mut lower = vec![None; data.len()];

        for (i, mean) in middle.iter().enumerate() {
            let Some(mean) = *mean else { continue };
            let variance = data[i + 1 - period..=i]
                .iter()
                .map(|x| (x - mean) * (x - mean))
                .sum::<Decimal>()
                / divisor;
            let Some(std) = variance.sqrt() else { continue };
            upper[i] = Some(mean + num_std * std);
            lower[i] = Some(mean - num_std * std);
        }

        Ok(BollingerBands {
            upper,
            middle,
            lower,
        })
    }

    /// Volume by price over equal-width bins spanning the bars' range
    ///
    /// Each bar's volume goes to the bin holding its typical price.
    pub fn calculate_volume_profile(
        &self,
        bars: &[Bar],
        bins: usize,
    ) -> Result<VolumeProfile, IndicatorError> {
        check_period("volume_profile", bins)?;
        tracing::trace!(bins, len = bars.len(), "Calculating volume profile");

        let Some(low) = bars.iter().map(|b| b.low).min() else {
            return Ok(VolumeProfile::default());
        };
        let high = bars.iter().map(|b| b.high).max().unwrap_or(low);

        let span = high - low;
        let width = if span.is_zero() {
            Decimal::ONE
        } else {
            span / Decimal::from(bins)
        };
        let bins = if span.is_zero() { 1 } else { bins };

        let mut levels: Vec<VolumeLevel> = (0..bins)
            .map(|i| VolumeLevel {
                price_low: low + width * Decimal::from(i),
                price_high: if i + 1 == bins {
                    high.max(low + width)
                } else {
                    low + width * Decimal::from(i + 1)
                },
                volume: Decimal::ZERO,
            })
            .collect();

        for bar in bars {
            let offset = ((bar.typical_price() - low) / width).floor();
            let index = offset.to_usize().unwrap_or(0).min(bins - 1);
            levels[index].volume += bar.volume;
        }

        let total_volume = levels.iter().map(|l| l.volume).sum();
        let point_of_control = levels
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.volume.cmp(&b.volume).then(ib.cmp(ia)))
            .filter(|(_, l)| !l.volume.is_zero())
            .map(|(_, l)| l.midpoint());

        Ok(VolumeProfile {
            levels,
            point_of_control,
            total_volume,
        })
    }

    /// Compute one named column per indicator output over the bars' closes
    ///
    /// All bars must belong to the same symbol.
    pub fn batch_calculate(
        &self,
        bars: &[Bar],
        specs: &[IndicatorSpec],
    ) -> Result<IndicatorFrame, IndicatorError> {
        if let Some(first) = bars.first() {
            if let Some(other) = bars.iter().find(|b| b.symbol != first.symbol) {
                return Err(IndicatorError::MixedSymbols(
                    first.symbol.clone(),
                    other.symbol.clone(),
                ));
            }
        }

        let started = Instant::now();
        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        let frame = self.calculate_all(&closes, specs)?;
        telemetry::record_latency(LatencyMetric::IndicatorCalculation, started.elapsed());

        tracing::debug!(
            bars = bars.len(),
            indicators = specs.len(),
            "Batch indicator calculation complete"
        );
        Ok(frame)
    }

    /// Compute every spec over a raw series
    pub fn calculate_all(
        &self,
        data: &[Decimal],
        specs: &[IndicatorSpec],
    ) -> Result<IndicatorFrame, IndicatorError> {
        let mut frame = IndicatorFrame::new(data.len());

        for spec in specs {
            let mut keys = spec.output_keys().into_iter();
            let mut put = |column| {
                if let Some(key) = keys.next() {
                    frame.insert(key, column);
                }
            };

            match *spec {
                IndicatorSpec::Sma { period } => put(self.calculate_sma(data, period)?),
                IndicatorSpec::Ema { period } => put(self.calculate_ema(data, period)?),
                IndicatorSpec::Rsi { period } => put(self.calculate_rsi(data, period)?),
                IndicatorSpec::Macd { fast, slow, signal } => {
                    let macd = self.calculate_macd(data, fast, slow, signal)?;
                    put(macd.macd);
                    put(macd.signal);
                    put(macd.histogram);
                }
                IndicatorSpec::Bollinger { period, num_std } => {
                    let bands = self.calculate_bollinger_bands(data, period, num_std)?;
                    put(bands.upper);
                    put(bands.middle);
                    put(bands.lower);
                }
            }
        }

        Ok(frame)
    }
}

fn ema(data: &[Decimal], period: usize) -> Vec<Decimal> {
    let alpha = Decimal::TWO / Decimal::from(period + 1);
    let mut out = Vec::with_capacity(data.len());
    let mut prev: Option<Decimal> = None;

    for &value in data {
        let next = match prev {
            None => value,
            Some(p) => alpha * value + (Decimal::ONE - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }

    out
}

fn rsi_value(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    if avg_loss.is_zero() {
        if avg_gain.is_zero() {
            dec!(50)
        } else {
            dec!(100)
        }
    } else {
        let rs = avg_gain / avg_loss;
        dec!(100) - dec!(100) / (Decimal::ONE + rs)
    }
}
