//! Configuration loading

use rt_investor::backtest::BacktestConfig;
use rt_investor::config::{Config, ConfigError};
use rust_decimal_macros::dec;
use std::collections::HashMap;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

#[test]
fn test_config_feeds_backtest() {
    let config = Config::from_lookup(lookup(&[
        ("INITIAL_CAPITAL", "5000"),
        ("COMMISSION", "0.002"),
        ("SLIPPAGE", "0"),
        ("RISK_PER_TRADE", "0.1"),
    ]))
    .unwrap();
    config.validate().unwrap();

    let bt = BacktestConfig::from_config(&config);
    assert_eq!(bt.initial_capital, dec!(5000));
    assert_eq!(bt.commission, dec!(0.002));
    assert_eq!(bt.slippage, dec!(0));
    assert_eq!(bt.risk_per_trade, dec!(0.1));
    assert_eq!(bt.periods_per_year, 252);
    bt.validate().unwrap();
}

#[test]
fn test_live_trading_requires_credentials() {
    let config = Config::from_lookup(lookup(&[("ENABLE_LIVE_TRADING", "TRUE")])).unwrap();
    assert!(config.features.enable_live_trading);
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}
