//! rt-investor: market-data streaming and trading research toolkit
//!
//! This library provides the core components for:
//! - Real-time market data over WebSocket with fan-out to subscribers
//! - Technical indicators (SMA, EMA, RSI, MACD, Bollinger Bands, volume profile)
//! - Rule-based signal generation and position sizing
//! - Event-driven backtesting with commission and slippage
//! - Bar storage in Parquet
//! - Logging and metrics

pub mod backtest;
pub mod cli;
pub mod config;
pub mod data;
pub mod indicators;
pub mod market;
pub mod signal;
pub mod stream;
pub mod telemetry;
pub mod utils;
pub mod ws;
