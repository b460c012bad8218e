//! Integration tests

mod backtest_test;
mod config_test;
mod stream_test;
