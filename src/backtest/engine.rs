//! Backtest engine: replays bars through a strategy and simulates fills

use super::analytics::{BacktestResult, MetricsConfig, PerformanceMetrics};
use super::portfolio::Portfolio;
use super::strategy::Strategy;
use super::types::{PortfolioSnapshot, Position, Trade, TradeAction};
use super::BacktestError;
use crate::config::Config;
use crate::data;
use crate::indicators::{IndicatorCalculator, IndicatorFrame, IndicatorSpec};
use crate::market::Bar;
use crate::signal::{Signal, SignalType};
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Backtest parameters
#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub initial_capital: Decimal,
    /// Commission as a fraction of notional
    pub commission: Decimal,
    /// Slippage as a fraction of notional
    pub slippage: Decimal,
    /// Fraction of equity committed per buy signal at full confidence
    pub risk_per_trade: Decimal,
    /// Periods per year for Sharpe annualization
    pub periods_per_year: u32,
    /// Risk-free rate per period
    pub risk_free_rate: Decimal,
    /// Indicators computed for the strategy on every bar
    pub indicators: Vec<IndicatorSpec>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: dec!(100000),
            commission: dec!(0.001),
            slippage: dec!(0.001),
            risk_per_trade: dec!(0.02),
            periods_per_year: 252,
            risk_free_rate: Decimal::ZERO,
            indicators: Vec::new(),
        }
    }
}

impl BacktestConfig {
    /// Capital, costs and risk from application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_capital: config.backtest.initial_capital,
            commission: config.backtest.commission,
            slippage: config.backtest.slippage,
            risk_per_trade: config.strategy.risk_per_trade,
            ..Default::default()
        }
    }

    /// Add indicators to compute
    pub fn with_indicators(mut self, specs: impl IntoIterator<Item = IndicatorSpec>) -> Self {
        self.indicators.extend(specs);
        self
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        let mut problems = Vec::new();
        if self.initial_capital <= Decimal::ZERO {
            problems.push(format!("initial capital must be positive, got {}", self.initial_capital));
        }
        if self.commission < Decimal::ZERO {
            problems.push(format!("commission must not be negative, got {}", self.commission));
        }
        if self.slippage < Decimal::ZERO {
            problems.push(format!("slippage must not be negative, got {}", self.slippage));
        }
        if self.commission + self.slippage >= Decimal::ONE {
            problems.push(format!(
                "commission plus slippage must be below 1, got {}",
                self.commission + self.slippage
            ));
        }
        if self.risk_per_trade <= Decimal::ZERO || self.risk_per_trade > Decimal::ONE {
            problems.push(format!("risk per trade must be in (0, 1], got {}", self.risk_per_trade));
        }
        if self.periods_per_year == 0 {
            problems.push("periods per year must be positive".to_string());
        }
        for spec in &self.indicators {
            spec.validate()?;
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BacktestError::InvalidConfig(problems.join("; ")))
        }
    }

    fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            periods_per_year: self.periods_per_year,
            risk_free_rate: self.risk_free_rate,
        }
    }
}

/// Result of [`Backtester::run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktestOutcome {
    /// The run simulated at least one bar
    Completed(BacktestResult),
    /// No bars were left after filtering
    NoData,
}

impl BacktestOutcome {
    pub fn result(&self) -> Option<&BacktestResult> {
        match self {
            BacktestOutcome::Completed(result) => Some(result),
            BacktestOutcome::NoData => None,
        }
    }
}

/// Event-driven backtesting engine
pub struct Backtester {
    config: BacktestConfig,
    portfolio: Portfolio,
    trades: Vec<Trade>,
    history: Vec<PortfolioSnapshot>,
    current_time: Option<DateTime<Utc>>,
    peak_equity: Decimal,
    calculator: IndicatorCalculator,
}

impl Backtester {
    /// Create an engine; the configuration is validated
    pub fn new(config: BacktestConfig) -> Result<Self, BacktestError> {
        config.validate()?;

        tracing::info!(
            capital = %config.initial_capital,
            commission_pct = %(config.commission * dec!(100)),
            slippage_pct = %(config.slippage * dec!(100)),
            "Backtester initialized"
        );

        Ok(Self {
            portfolio: Portfolio::new(config.initial_capital),
            peak_equity: config.initial_capital,
            trades: Vec::new(),
            history: Vec::new(),
            current_time: None,
            calculator: IndicatorCalculator::new(),
            config,
        })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Load bars for `symbols` (all when empty) from a Parquet file or
    /// directory, sorted by timestamp then symbol
    pub fn load_data(
        &self,
        data_source: impl AsRef<Path>,
        symbols: &[String],
    ) -> Result<Vec<Bar>, BacktestError> {
        let source = data_source.as_ref();
        tracing::info!(source = ?source, symbols = ?symbols, "Loading historical data");

        let wanted: HashSet<String> = symbols.iter().map(|s| s.to_ascii_uppercase()).collect();
        let mut bars = data::read_bars(source)?;
        if !wanted.is_empty() {
            bars.retain(|b| wanted.contains(&b.symbol.to_ascii_uppercase()));
        }
        bars.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        tracing::info!(bars = bars.len(), "Historical data loaded");
        Ok(bars)
    }

    /// Run `strategy` over `data`
    ///
    /// `data` must be in chronological order without duplicate
    /// (symbol, timestamp) pairs. Bars outside `[start_date, end_date]` are
    /// not traded but earlier bars still feed the indicators.
    pub fn run<S>(
        &mut self,
        data: &[Bar],
        strategy: &mut S,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<BacktestOutcome, BacktestError>
    where
        S: Strategy + ?Sized,
    {
        let outcome = self.replay(data, strategy, start_date, end_date);
        // Trades placed after the run are stamped with wall-clock time
        self.current_time = None;
        outcome
    }

    fn replay<S>(
        &mut self,
        data: &[Bar],
        strategy: &mut S,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> Result<BacktestOutcome, BacktestError>
    where
        S: Strategy + ?Sized,
    {
        validate_bars(data)?;

        let in_range = |bar: &Bar| {
            start_date.map_or(true, |start| bar.timestamp >= start)
                && end_date.map_or(true, |end| bar.timestamp <= end)
        };

        self.reset();
        strategy.reset();

        if !data.iter().any(in_range) {
            tracing::warn!(
                bars = data.len(),
                start = ?start_date,
                end = ?end_date,
                "No data in backtest range"
            );
            return Ok(BacktestOutcome::NoData);
        }

        tracing::info!(bars = data.len(), "Starting backtest");
        let started = Instant::now();

        let mut specs = self.config.indicators.clone();
        for spec in strategy.required_indicators() {
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }

        // Bars feeding indicators stop at the end of the range
        let history: Vec<&Bar> = data
            .iter()
            .filter(|b| end_date.map_or(true, |end| b.timestamp <= end))
            .collect();
        let (frames, rows) = self.indicator_frames(&history, &specs)?;

        let mut steps = 0;
        let mut i = 0;
        while i < history.len() {
            let timestamp = history[i].timestamp;
            let mut traded_step = false;

            while i < history.len() && history[i].timestamp == timestamp {
                let bar = history[i];
                let row = rows[i];
                i += 1;

                self.portfolio.mark(&bar.symbol, bar.close);
                if !in_range(bar) {
                    continue;
                }
                traded_step = true;
                self.current_time = Some(bar.timestamp);

                let indicators = frames
                    .get(bar.symbol.as_str())
                    .map(|frame| frame.snapshot(row))
                    .unwrap_or_default();
                let signal = strategy.on_bar(bar, &indicators);
                self.act(bar, &signal)?;
            }

            if traded_step {
                self.record_snapshot(timestamp);
                steps += 1;
            }
        }

        let result = self.result(steps);
        telemetry::record_latency(LatencyMetric::BacktestRun, started.elapsed());
        tracing::info!(
            steps,
            trades = result.total_trades,
            final_capital = %result.final_capital,
            total_return = %result.total_return,
            "Backtest completed"
        );

        Ok(BacktestOutcome::Completed(result))
    }

    /// Indicator frames per symbol and the row of each bar in its frame
    fn indicator_frames<'a>(
        &self,
        bars: &[&'a Bar],
        specs: &[IndicatorSpec],
    ) -> Result<(HashMap<&'a str, IndicatorFrame>, Vec<usize>), BacktestError> {
        let mut closes: BTreeMap<&'a str, Vec<Decimal>> = BTreeMap::new();
        let mut rows = Vec::with_capacity(bars.len());

        for bar in bars {
            let series = closes.entry(bar.symbol.as_str()).or_default();
            rows.push(series.len());
            series.push(bar.close);
        }

        let mut frames = HashMap::new();
        if specs.is_empty() {
            return Ok((frames, rows));
        }
        for (symbol, series) in closes {
            frames.insert(symbol, self.calculator.calculate_all(&series, specs)?);
        }
        Ok((frames, rows))
    }

    /// Translate a signal into a trade for `bar`
    fn act(&mut self, bar: &Bar, signal: &Signal) -> Result<(), BacktestError> {
        let price = bar.close;

        match signal.signal {
            SignalType::Buy => {
                let unit_cost = price * (Decimal::ONE + self.config.commission + self.config.slippage);
                if unit_cost <= Decimal::ZERO {
                    tracing::debug!(symbol = %bar.symbol, %price, "Skipping buy at non-positive price");
                    return Ok(());
                }

                let budget = self.portfolio.equity() * self.config.risk_per_trade * signal.confidence;
                let quantity = (budget / unit_cost)
                    .floor()
                    .min((self.portfolio.cash() / unit_cost).floor());

                if quantity <= Decimal::ZERO {
                    tracing::debug!(
                        symbol = %bar.symbol,
                        %budget,
                        cash = %self.portfolio.cash(),
                        "Buy signal with nothing affordable, skipping"
                    );
                    return Ok(());
                }

                self.execute_trade(&bar.symbol, TradeAction::Buy, quantity, price)?;
            }
            SignalType::Sell => {
                let held = self.portfolio.quantity(&bar.symbol);
                if held <= Decimal::ZERO {
                    tracing::debug!(symbol = %bar.symbol, "Sell signal without a position, skipping");
                    return Ok(());
                }

                self.execute_trade(&bar.symbol, TradeAction::Sell, held, price)?;
            }
            SignalType::Hold | SignalType::Neutral => {}
        }

        Ok(())
    }

    /// Simulate one fill with commission and slippage
    ///
    /// The trade is stamped with the bar being processed, or the current
    /// time outside a run.
    pub fn execute_trade(
        &mut self,
        symbol: &str,
        action: TradeAction,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<Trade, BacktestError> {
        if quantity <= Decimal::ZERO {
            return Err(BacktestError::InvalidQuantity(quantity));
        }
        if price <= Decimal::ZERO {
            return Err(BacktestError::InvalidPrice(price));
        }

        let notional = price * quantity;
        let commission = notional * self.config.commission;
        let slippage = notional * self.config.slippage;

        let realized_pnl = match action {
            TradeAction::Buy => {
                self.portfolio
                    .buy(symbol, quantity, price, commission + slippage)?;
                None
            }
            TradeAction::Sell => Some(self.portfolio.sell(
                symbol,
                quantity,
                price,
                commission + slippage,
            )?),
        };

        let trade = Trade {
            id: Uuid::new_v4(),
            timestamp: self.current_time.unwrap_or_else(Utc::now),
            symbol: symbol.to_string(),
            action,
            quantity,
            price,
            commission,
            slippage,
            realized_pnl,
        };

        tracing::debug!(
            symbol,
            %action,
            %quantity,
            %price,
            cash = %self.portfolio.cash(),
            "Executed trade"
        );
        telemetry::increment(CounterMetric::TradesExecuted, 1);

        self.trades.push(trade.clone());
        Ok(trade)
    }

    fn record_snapshot(&mut self, timestamp: DateTime<Utc>) {
        let cash = self.portfolio.cash();
        let positions_value = self.portfolio.positions_value();
        let total_equity = cash + positions_value;

        self.peak_equity = self.peak_equity.max(total_equity);
        let drawdown = if self.peak_equity.is_zero() {
            Decimal::ZERO
        } else {
            (self.peak_equity - total_equity) / self.peak_equity
        };

        telemetry::set_gauge(GaugeMetric::Equity, total_equity.to_f64().unwrap_or_default());
        telemetry::set_gauge(GaugeMetric::Cash, cash.to_f64().unwrap_or_default());
        telemetry::set_gauge(
            GaugeMetric::OpenPositions,
            self.portfolio.positions().len() as f64,
        );
        telemetry::set_gauge(
            GaugeMetric::DrawdownPct,
            (drawdown * dec!(100)).to_f64().unwrap_or_default(),
        );

        self.history.push(PortfolioSnapshot {
            timestamp,
            cash,
            positions_value,
            total_equity,
        });
    }

    /// Performance metrics over the recorded history
    pub fn calculate_metrics(&self) -> PerformanceMetrics {
        tracing::debug!("Calculating performance metrics");
        PerformanceMetrics::compute(
            self.config.initial_capital,
            self.portfolio.equity(),
            &self.history,
            &self.trades,
            self.config.metrics_config(),
        )
    }

    fn result(&self, steps: usize) -> BacktestResult {
        BacktestResult::new(
            self.config.initial_capital,
            self.portfolio.equity(),
            self.calculate_metrics(),
            &self.trades,
            steps,
        )
    }

    /// One snapshot per simulated time step
    pub fn portfolio_history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }

    /// Every executed trade in order
    pub fn trade_history(&self) -> &[Trade] {
        &self.trades
    }

    /// Open positions by symbol
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.portfolio.positions().values()
    }

    pub fn cash(&self) -> Decimal {
        self.portfolio.cash()
    }

    /// Cash plus positions at their last known prices
    pub fn equity(&self) -> Decimal {
        self.portfolio.equity()
    }

    /// Clear trades and history and return to the initial capital
    pub fn reset(&mut self) {
        tracing::debug!("Resetting backtester");
        self.portfolio = Portfolio::new(self.config.initial_capital);
        self.peak_equity = self.config.initial_capital;
        self.trades.clear();
        self.history.clear();
        self.current_time = None;
    }
}

/// Reject out-of-order bars and duplicate (symbol, timestamp) pairs
fn validate_bars(data: &[Bar]) -> Result<(), BacktestError> {
    let mut seen: HashSet<(&str, DateTime<Utc>)> = HashSet::with_capacity(data.len());

    for (index, bar) in data.iter().enumerate() {
        if let Some(prev) = index.checked_sub(1).map(|p| &data[p]) {
            if bar.timestamp < prev.timestamp {
                return Err(BacktestError::NonChronological {
                    index,
                    previous: prev.timestamp,
                    current: bar.timestamp,
                });
            }
        }
        if !seen.insert((bar.symbol.as_str(), bar.timestamp)) {
            return Err(BacktestError::DuplicateBar {
                symbol: bar.symbol.clone(),
                timestamp: bar.timestamp,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::IndicatorSnapshot;
    use crate::signal::SignalGenerator;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
    }

    fn bars(symbol: &str, closes: &[Decimal]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, close)| Bar::flat(base() + Duration::days(i as i64), symbol, *close, dec!(100)))
            .collect()
    }

    fn frictionless(capital: Decimal) -> BacktestConfig {
        BacktestConfig {
            initial_capital: capital,
            commission: Decimal::ZERO,
            slippage: Decimal::ZERO,
            risk_per_trade: dec!(0.5),
            ..Default::default()
        }
    }

    fn hold(bar: &Bar, _: &IndicatorSnapshot) -> Signal {
        Signal::for_bar(bar, SignalType::Hold, Decimal::ZERO)
    }

    /// Buys on the first bar and sells on the bar at `sell_at`
    fn buy_then_sell(sell_at: usize) -> impl FnMut(&Bar, &IndicatorSnapshot) -> Signal {
        let mut seen = 0;
        move |bar: &Bar, _: &IndicatorSnapshot| {
            let signal = match seen {
                0 => SignalType::Buy,
                n if n == sell_at => SignalType::Sell,
                _ => SignalType::Hold,
            };
            seen += 1;
            Signal::for_bar(bar, signal, Decimal::ONE)
        }
    }

    #[test]
    fn test_hold_keeps_capital() {
        let data = bars("AAPL", &[dec!(10), dec!(11), dec!(12)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();

        let outcome = backtester.run(&data, &mut hold, None, None).unwrap();
        let result = outcome.result().unwrap();

        assert_eq!(result.final_capital, dec!(1000));
        assert_eq!(result.total_return, Decimal::ZERO);
        assert_eq!(result.total_trades, 0);
        assert_eq!(result.steps, 3);
        assert_eq!(result.max_drawdown, Some(Decimal::ZERO));
        assert_eq!(backtester.portfolio_history().len(), 3);
    }

    #[test]
    fn test_buy_then_sell_round_trip() {
        let data = bars("AAPL", &[dec!(10), dec!(11), dec!(12)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();

        let outcome = backtester.run(&data, &mut buy_then_sell(2), None, None).unwrap();
        let result = outcome.result().unwrap();

        let trades = backtester.trade_history();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].action, TradeAction::Buy);
        assert_eq!(trades[0].quantity, dec!(50));
        assert_eq!(trades[0].timestamp, data[0].timestamp);
        assert_eq!(trades[1].action, TradeAction::Sell);
        assert_eq!(trades[1].realized_pnl, Some(dec!(100)));

        assert_eq!(result.final_capital, dec!(1100));
        assert_eq!(result.total_return, dec!(0.1));
        assert_eq!(result.winning_trades, 1);
        assert_eq!(result.win_rate, Some(Decimal::ONE));
        assert_eq!(backtester.positions().count(), 0);

        let equity: Vec<Decimal> = backtester
            .portfolio_history()
            .iter()
            .map(|s| s.total_equity)
            .collect();
        assert_eq!(equity, vec![dec!(1000), dec!(1050), dec!(1100)]);
    }

    #[test]
    fn test_costs_reduce_quantity_and_cash() {
        let data = bars("AAPL", &[dec!(10)]);
        let config = BacktestConfig {
            commission: dec!(0.01),
            ..frictionless(dec!(1000))
        };
        let mut backtester = Backtester::new(config).unwrap();

        backtester.run(&data, &mut buy_then_sell(usize::MAX), None, None).unwrap();

        let trade = &backtester.trade_history()[0];
        // 500 / 10.10 floors to 49 shares
        assert_eq!(trade.quantity, dec!(49));
        assert_eq!(trade.commission, dec!(4.9));
        assert_eq!(backtester.cash(), dec!(1000) - dec!(490) - dec!(4.9));
    }

    #[test]
    fn test_sell_without_position_is_skipped() {
        let data = bars("AAPL", &[dec!(10), dec!(11)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();
        let mut always_sell =
            |bar: &Bar, _: &IndicatorSnapshot| Signal::for_bar(bar, SignalType::Sell, Decimal::ONE);

        let outcome = backtester.run(&data, &mut always_sell, None, None).unwrap();
        assert_eq!(outcome.result().unwrap().total_trades, 0);
        assert_eq!(backtester.cash(), dec!(1000));
    }

    #[test]
    fn test_buy_capped_by_cash() {
        let data = bars("AAPL", &[dec!(10), dec!(10), dec!(10)]);
        let config = BacktestConfig {
            risk_per_trade: Decimal::ONE,
            ..frictionless(dec!(100))
        };
        let mut backtester = Backtester::new(config).unwrap();
        let mut always_buy =
            |bar: &Bar, _: &IndicatorSnapshot| Signal::for_bar(bar, SignalType::Buy, Decimal::ONE);

        backtester.run(&data, &mut always_buy, None, None).unwrap();

        // The first buy spends everything, later buys are unaffordable
        assert_eq!(backtester.trade_history().len(), 1);
        assert_eq!(backtester.cash(), Decimal::ZERO);
        assert_eq!(backtester.equity(), dec!(100));
    }

    #[test]
    fn test_rejects_unordered_and_duplicate_bars() {
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();

        let mut data = bars("AAPL", &[dec!(10), dec!(11)]);
        data.reverse();
        let err = backtester.run(&data, &mut hold, None, None).unwrap_err();
        assert!(matches!(err, BacktestError::NonChronological { index: 1, .. }));

        let mut data = bars("AAPL", &[dec!(10)]);
        data.push(data[0].clone());
        let err = backtester.run(&data, &mut hold, None, None).unwrap_err();
        assert!(matches!(err, BacktestError::DuplicateBar { ref symbol, .. } if symbol == "AAPL"));
    }

    #[test]
    fn test_empty_range_reports_no_data() {
        let data = bars("AAPL", &[dec!(10), dec!(11)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();

        let start = base() + Duration::days(30);
        let outcome = backtester.run(&data, &mut hold, Some(start), None).unwrap();
        assert_eq!(outcome, BacktestOutcome::NoData);

        let outcome = backtester.run(&[], &mut hold, None, None).unwrap();
        assert_eq!(outcome, BacktestOutcome::NoData);
    }

    #[test]
    fn test_date_range_is_inclusive_and_warms_indicators() {
        let data = bars("AAPL", &[dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)]);
        let config = frictionless(dec!(1000)).with_indicators(["sma_2".parse().unwrap()]);
        let mut backtester = Backtester::new(config).unwrap();

        let mut seen = Vec::new();
        let mut record = |bar: &Bar, indicators: &IndicatorSnapshot| {
            seen.push((bar.close, indicators.get("sma_2")));
            Signal::for_bar(bar, SignalType::Hold, Decimal::ZERO)
        };

        let start = base() + Duration::days(1);
        let end = base() + Duration::days(3);
        let outcome = backtester.run(&data, &mut record, Some(start), Some(end)).unwrap();

        assert_eq!(outcome.result().unwrap().steps, 3);
        assert_eq!(
            seen,
            vec![
                (dec!(2), Some(dec!(1.5))),
                (dec!(3), Some(dec!(2.5))),
                (dec!(4), Some(dec!(3.5))),
            ]
        );
    }

    #[test]
    fn test_multiple_symbols_share_a_step() {
        let mut data = bars("AAPL", &[dec!(10), dec!(11)]);
        data.extend(bars("MSFT", &[dec!(20), dec!(21)]));
        data.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.symbol.cmp(&b.symbol)));

        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();
        let outcome = backtester.run(&data, &mut hold, None, None).unwrap();

        assert_eq!(outcome.result().unwrap().steps, 2);
        assert_eq!(backtester.portfolio_history().len(), 2);
    }

    #[test]
    fn test_signal_generator_as_strategy() {
        let closes: Vec<Decimal> = [5, 4, 3, 2, 1, 2, 3, 4, 5, 6, 5, 4, 3, 2, 1]
            .into_iter()
            .map(Decimal::from)
            .collect();
        let data = bars("AAPL", &closes);
        let mut generator = SignalGenerator::new("sma_crossover_2_4").unwrap();
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();

        let outcome = backtester.run(&data, &mut generator, None, None).unwrap();
        let result = outcome.result().unwrap();

        assert!(result.total_trades >= 2);
        assert_eq!(backtester.trade_history()[0].action, TradeAction::Buy);
        assert_eq!(generator.get_signal_history(None, 100).len(), data.len());
    }

    #[test]
    fn test_execute_trade_validates() {
        let mut backtester = Backtester::new(frictionless(dec!(100))).unwrap();

        assert!(matches!(
            backtester.execute_trade("AAPL", TradeAction::Buy, Decimal::ZERO, dec!(10)),
            Err(BacktestError::InvalidQuantity(_))
        ));
        assert!(matches!(
            backtester.execute_trade("AAPL", TradeAction::Buy, dec!(1), dec!(-1)),
            Err(BacktestError::InvalidPrice(_))
        ));
        assert!(matches!(
            backtester.execute_trade("AAPL", TradeAction::Buy, dec!(20), dec!(10)),
            Err(BacktestError::InsufficientCash { .. })
        ));
        assert!(matches!(
            backtester.execute_trade("AAPL", TradeAction::Sell, dec!(1), dec!(10)),
            Err(BacktestError::InsufficientPosition { .. })
        ));

        let trade = backtester
            .execute_trade("AAPL", TradeAction::Buy, dec!(5), dec!(10))
            .unwrap();
        assert_eq!(trade.notional(), dec!(50));
        assert_eq!(backtester.cash(), dec!(50));

        backtester.reset();
        assert_eq!(backtester.cash(), dec!(100));
        assert!(backtester.trade_history().is_empty());
    }

    #[test]
    fn test_trade_after_run_uses_wall_clock() {
        let data = bars("AAPL", &[dec!(10), dec!(11)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();
        backtester.run(&data, &mut hold, None, None).unwrap();

        let before = Utc::now();
        let trade = backtester
            .execute_trade("AAPL", TradeAction::Buy, dec!(1), dec!(10))
            .unwrap();
        assert!(trade.timestamp >= before);
        assert_ne!(trade.timestamp, data[1].timestamp);
    }

    #[test]
    fn test_trade_after_failed_run_uses_wall_clock() {
        let data = bars("AAPL", &[dec!(10), dec!(11)]);
        let mut backtester = Backtester::new(frictionless(dec!(1000))).unwrap();
        let mut always_buy = |bar: &Bar, _: &IndicatorSnapshot| {
            Signal::for_bar(bar, SignalType::Buy, Decimal::ONE)
        };
        backtester.run(&data, &mut always_buy, None, None).unwrap();

        let mut unordered = data.clone();
        unordered.reverse();
        assert!(backtester.run(&unordered, &mut hold, None, None).is_err());

        let before = Utc::now();
        let trade = backtester
            .execute_trade("AAPL", TradeAction::Buy, dec!(1), dec!(10))
            .unwrap();
        assert!(trade.timestamp >= before);
    }

    #[test]
    fn test_costs_at_or_above_notional_rejected() {
        let config = BacktestConfig {
            commission: Decimal::ONE,
            slippage: Decimal::ONE,
            ..frictionless(dec!(100))
        };
        let err = Backtester::new(config).err().unwrap();
        assert!(matches!(err, BacktestError::InvalidConfig(ref msg) if msg.contains("commission plus slippage")));

        let config = BacktestConfig {
            commission: dec!(0.6),
            slippage: dec!(0.4),
            ..frictionless(dec!(100))
        };
        assert!(Backtester::new(config).is_err());

        // Just below the limit a round trip keeps cash non-negative
        let config = BacktestConfig {
            commission: dec!(0.5),
            slippage: dec!(0.49),
            ..frictionless(dec!(100))
        };
        let mut backtester = Backtester::new(config).unwrap();
        backtester
            .execute_trade("AAPL", TradeAction::Buy, dec!(3), dec!(10))
            .unwrap();
        backtester
            .execute_trade("AAPL", TradeAction::Sell, dec!(3), dec!(10))
            .unwrap();
        assert!(backtester.cash() >= Decimal::ZERO);
    }

    #[test]
    fn test_invalid_config() {
        let config = BacktestConfig {
            initial_capital: Decimal::ZERO,
            commission: dec!(-0.1),
            ..Default::default()
        };
        let err = Backtester::new(config).err().unwrap();
        assert!(matches!(err, BacktestError::InvalidConfig(ref msg) if msg.contains("capital") && msg.contains("commission")));
    }
}
