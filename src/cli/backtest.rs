//! Backtest command implementation

use crate::backtest::{BacktestConfig, BacktestOutcome, Backtester};
use crate::config::{parse_symbols, Config};
use crate::indicators::IndicatorSpec;
use crate::signal::SignalGenerator;
use crate::utils::parse_timestamp;
use anyhow::Context;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct BacktestArgs {
    /// Parquet file or directory of bars (defaults to DATA_DIR)
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Comma-separated symbols (defaults to DEFAULT_SYMBOLS)
    #[arg(long)]
    pub symbols: Option<String>,

    /// Strategy name (defaults to STRATEGY_NAME)
    #[arg(long)]
    pub strategy: Option<String>,

    /// Start time filter, inclusive (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,

    /// End time filter, inclusive (RFC 3339 or YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<String>,

    /// Initial capital (defaults to INITIAL_CAPITAL)
    #[arg(long)]
    pub capital: Option<Decimal>,

    /// Extra indicators to compute, e.g. rsi_14 or macd_12_26_9
    #[arg(long = "indicator")]
    pub indicators: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Also write the JSON report to this file
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl BacktestArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let data_source = self.data.clone().unwrap_or_else(|| config.data.data_dir.clone());
        let symbols = self
            .symbols
            .as_deref()
            .map(parse_symbols)
            .unwrap_or_else(|| config.market.default_symbols.clone());
        let strategy_name = self
            .strategy
            .as_deref()
            .unwrap_or(&config.strategy.strategy_name);

        let start = self
            .start
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .context("invalid --start")?;
        let end = self
            .end
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .context("invalid --end")?;

        let indicators = self
            .indicators
            .iter()
            .map(|s| s.parse::<IndicatorSpec>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut bt_config = BacktestConfig::from_config(config).with_indicators(indicators);
        if let Some(capital) = self.capital {
            bt_config.initial_capital = capital;
        }

        let mut strategy = SignalGenerator::new(strategy_name)?;
        let mut backtester = Backtester::new(bt_config)?;

        tracing::info!(
            source = ?data_source,
            symbols = ?symbols,
            strategy = strategy_name,
            "Running backtest"
        );

        let data = backtester.load_data(&data_source, &symbols)?;
        let result = match backtester.run(&data, &mut strategy, start, end)? {
            BacktestOutcome::Completed(result) => result,
            BacktestOutcome::NoData => {
                println!("No bars in {:?} for the requested symbols and range", data_source);
                return Ok(());
            }
        };

        let report = serde_json::json!({
            "strategy": strategy_name,
            "symbols": symbols,
            "result": result,
            "trades": backtester.trade_history(),
        });

        match self.format {
            OutputFormat::Table => println!("{}", result.format_table()),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        }

        if let Some(ref path) = self.output {
            std::fs::write(path, serde_json::to_string_pretty(&report)?)
                .with_context(|| format!("failed to write report to {:?}", path))?;
            tracing::info!(path = ?path, "Wrote backtest report");
        }

        Ok(())
    }
}
