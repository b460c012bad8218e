//! CLI interface for rt-investor
//!
//! Provides subcommands for:
//! - `backtest`: Run a strategy over recorded bars
//! - `stream`: Stream live market data, optionally recording bars
//! - `config`: Show the effective configuration

mod backtest;
mod stream;

pub use backtest::{BacktestArgs, OutputFormat};
pub use stream::StreamArgs;

use crate::config::Config;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "rt-investor")]
#[command(about = "Market-data streaming, indicators and backtesting for trading research")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override LOG_LEVEL
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a backtest over Parquet bars
    Backtest(BacktestArgs),
    /// Stream live market data
    Stream(StreamArgs),
    /// Show the effective configuration
    Config,
}

/// Render the configuration with secrets redacted
pub fn describe_config(config: &Config) -> String {
    let set = |value: &Option<String>| if value.is_some() { "set" } else { "not set" };

    let lines = [
        "Current configuration:".to_string(),
        format!("  Endpoint: {}", config.api.websocket_endpoint),
        format!("  API key: {}", set(&config.api.api_key)),
        format!("  API secret: {}", set(&config.api.api_secret)),
        format!("  Data dir: {}", config.data.data_dir.display()),
        format!("  Cache dir: {}", config.data.cache_dir.display()),
        format!(
            "  Capital: {}, commission: {}, slippage: {}",
            config.backtest.initial_capital, config.backtest.commission, config.backtest.slippage
        ),
        format!(
            "  Strategy: {} (risk per trade {})",
            config.strategy.strategy_name, config.strategy.risk_per_trade
        ),
        format!("  Symbols: {}", config.market.default_symbols.join(",")),
        format!("  Log level: {}", config.logging.log_level),
        format!(
            "  Live trading: {}, notifications: {}",
            config.features.enable_live_trading, config.features.enable_notifications
        ),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backtest_args() {
        let cli = Cli::try_parse_from([
            "rt-investor",
            "backtest",
            "--symbols",
            "aapl,msft",
            "--indicator",
            "rsi_14",
            "--indicator",
            "sma_20",
            "--format",
            "json",
        ])
        .unwrap();

        let Commands::Backtest(args) = cli.command else {
            panic!("expected backtest");
        };
        assert_eq!(args.symbols.as_deref(), Some("aapl,msft"));
        assert_eq!(args.indicators, vec!["rsi_14", "sma_20"]);
        assert_eq!(args.format, OutputFormat::Json);
    }

    #[test]
    fn test_describe_config_hides_secrets() {
        let mut config = Config::default();
        config.api.api_key = Some("hunter2".to_string());

        let text = describe_config(&config);
        assert!(text.contains("API key: set"));
        assert!(text.contains("API secret: not set"));
        assert!(!text.contains("hunter2"));
        assert!(text.contains("AAPL,GOOGL,MSFT"));
    }
}
