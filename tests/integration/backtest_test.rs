//! End-to-end backtests over bars stored in Parquet

use chrono::{Duration, TimeZone, Utc};
use rt_investor::backtest::{BacktestConfig, BacktestOutcome, Backtester, TradeAction};
use rt_investor::data::write_bars;
use rt_investor::market::Bar;
use rt_investor::signal::SignalGenerator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

/// A down-up-down price path that produces one crossover each way
fn wave(symbol: &str, offset: i64) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    [10, 9, 8, 7, 6, 7, 8, 9, 10, 11, 12, 11, 10, 9, 8, 7]
        .into_iter()
        .enumerate()
        .map(|(i, close)| {
            let close = Decimal::from(close + offset);
            Bar::new(
                base + Duration::days(i as i64),
                symbol,
                close,
                close + dec!(0.5),
                close - dec!(0.5),
                close,
                dec!(1000),
            )
        })
        .collect()
}

fn config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: dec!(10000),
        commission: dec!(0.001),
        slippage: dec!(0.0005),
        risk_per_trade: dec!(0.5),
        ..Default::default()
    }
}

#[test]
fn test_backtest_from_parquet_directory() {
    let dir = TempDir::new().unwrap();
    write_bars(&dir.path().join("aapl.parquet"), &wave("AAPL", 100)).unwrap();
    write_bars(&dir.path().join("msft.parquet"), &wave("MSFT", 200)).unwrap();

    let mut backtester = Backtester::new(config()).unwrap();
    let data = backtester
        .load_data(dir.path(), &["aapl".to_string()])
        .unwrap();
    assert_eq!(data.len(), 16);
    assert!(data.iter().all(|b| b.symbol == "AAPL"));

    let mut strategy = SignalGenerator::new("sma_crossover_2_4").unwrap();
    let outcome = backtester.run(&data, &mut strategy, None, None).unwrap();
    let BacktestOutcome::Completed(result) = outcome else {
        panic!("expected a completed run");
    };

    let trades = backtester.trade_history();
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].action, TradeAction::Buy);
    assert_eq!(trades[1].action, TradeAction::Sell);
    assert!(trades[0].commission > Decimal::ZERO);
    assert!(trades[1].realized_pnl.unwrap() > Decimal::ZERO);

    assert_eq!(result.total_trades, 2);
    assert_eq!(result.steps, 16);
    assert!(result.final_capital > result.initial_capital);
    assert_eq!(result.final_capital, backtester.cash());
    assert!(result.sharpe_ratio.is_some());
    assert!(result.max_drawdown.unwrap() >= Decimal::ZERO);
    assert_eq!(backtester.portfolio_history().len(), 16);

    assert!(result.format_table().contains("Total Return"));
}

#[test]
fn test_backtest_all_symbols_and_rerun_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let mut bars = wave("AAPL", 100);
    bars.extend(wave("MSFT", 200));
    write_bars(&dir.path().join("bars.parquet"), &bars).unwrap();

    let mut backtester = Backtester::new(config()).unwrap();
    let data = backtester.load_data(dir.path(), &[]).unwrap();
    assert_eq!(data.len(), 32);
    assert!(data.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let mut strategy = SignalGenerator::new("sma_crossover_2_4").unwrap();
    let first = backtester.run(&data, &mut strategy, None, None).unwrap();
    let second = backtester.run(&data, &mut strategy, None, None).unwrap();

    assert_eq!(first, second);
    let result = first.result().unwrap();
    assert_eq!(result.steps, 16);
    assert_eq!(result.total_trades, 4);
}

#[test]
fn test_missing_data_source_is_an_error() {
    let dir = TempDir::new().unwrap();
    let backtester = Backtester::new(config()).unwrap();
    assert!(backtester
        .load_data(dir.path().join("missing.parquet"), &[])
        .is_err());
}
