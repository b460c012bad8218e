//! Performance metrics and reporting

use super::types::{PortfolioSnapshot, Trade};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::Serialize;
use std::fmt::Display;

/// Performance metrics over a run
///
/// A metric that cannot be computed from the available history is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    /// (final equity - initial capital) / initial capital
    pub total_return: Decimal,
    /// Annualized Sharpe ratio of per-step equity returns
    pub sharpe_ratio: Option<Decimal>,
    /// Largest peak-to-trough decline as a fraction of the peak
    pub max_drawdown: Option<Decimal>,
    /// Fraction of closing trades with positive realized P&L
    pub win_rate: Option<Decimal>,
    /// Gross profit over gross loss of closing trades
    pub profit_factor: Option<Decimal>,
}

/// Inputs that shape the metrics
#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    pub periods_per_year: u32,
    /// Risk-free rate per period, subtracted from each return
    pub risk_free_rate: Decimal,
}

impl PerformanceMetrics {
    /// Compute metrics from the equity history and trades
    ///
    /// The equity curve starts at `initial_capital` followed by one point
    /// per snapshot.
    pub fn compute(
        initial_capital: Decimal,
        final_equity: Decimal,
        history: &[PortfolioSnapshot],
        trades: &[Trade],
        config: MetricsConfig,
    ) -> Self {
        let curve: Vec<Decimal> = std::iter::once(initial_capital)
            .chain(history.iter().map(|s| s.total_equity))
            .collect();

        let total_return = if initial_capital.is_zero() {
            Decimal::ZERO
        } else {
            (final_equity - initial_capital) / initial_capital
        };

        let closing: Vec<Decimal> = trades.iter().filter_map(|t| t.realized_pnl).collect();

        Self {
            total_return,
            sharpe_ratio: sharpe_ratio(&curve, config),
            max_drawdown: (!history.is_empty()).then(|| max_drawdown(&curve)),
            win_rate: win_rate(&closing),
            profit_factor: profit_factor(&closing),
        }
    }
}

/// Mean over sample standard deviation of per-step returns, scaled by
/// `sqrt(periods_per_year)`
pub fn sharpe_ratio(curve: &[Decimal], config: MetricsConfig) -> Option<Decimal> {
    let returns: Vec<Decimal> = curve
        .windows(2)
        .filter(|w| w[0] > Decimal::ZERO)
        .map(|w| w[1] / w[0] - Decimal::ONE - config.risk_free_rate)
        .collect();

    if returns.len() < 2 {
        return None;
    }

    let n = Decimal::from(returns.len());
    let mean = returns.iter().sum::<Decimal>() / n;
    let variance = returns
        .iter()
        .map(|r| (r - mean) * (r - mean))
        .sum::<Decimal>()
        / (n - Decimal::ONE);

    let std = variance.sqrt()?;
    if std.is_zero() {
        return None;
    }

    let scale = Decimal::from(config.periods_per_year).sqrt()?;
    Some(mean / std * scale)
}

/// Largest fractional decline from a running peak
pub fn max_drawdown(curve: &[Decimal]) -> Decimal {
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;

    for &equity in curve {
        if equity > peak {
            peak = equity;
        } else if peak > Decimal::ZERO {
            worst = worst.max((peak - equity) / peak);
        }
    }

    worst
}

fn win_rate(closing: &[Decimal]) -> Option<Decimal> {
    if closing.is_empty() {
        return None;
    }
    let wins = closing.iter().filter(|p| **p > Decimal::ZERO).count();
    Some(Decimal::from(wins) / Decimal::from(closing.len()))
}

fn profit_factor(closing: &[Decimal]) -> Option<Decimal> {
    let gross_profit: Decimal = closing.iter().filter(|p| **p > Decimal::ZERO).sum();
    let gross_loss: Decimal = closing
        .iter()
        .filter(|p| **p < Decimal::ZERO)
        .map(|p| -p)
        .sum();

    (!gross_loss.is_zero()).then(|| gross_profit / gross_loss)
}

/// Summary of a completed backtest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BacktestResult {
    pub initial_capital: Decimal,
    pub final_capital: Decimal,
    pub total_return: Decimal,
    /// Buys and sells
    pub total_trades: usize,
    /// Sells with positive realized P&L
    pub winning_trades: usize,
    /// Sells with negative realized P&L
    pub losing_trades: usize,
    pub max_drawdown: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub win_rate: Option<Decimal>,
    pub profit_factor: Option<Decimal>,
    /// Simulated time steps
    pub steps: usize,
}

impl BacktestResult {
    /// Build from metrics and the trade log
    pub fn new(
        initial_capital: Decimal,
        final_capital: Decimal,
        metrics: PerformanceMetrics,
        trades: &[Trade],
        steps: usize,
    ) -> Self {
        let closing = trades.iter().filter_map(|t| t.realized_pnl);
        Self {
            initial_capital,
            final_capital,
            total_return: metrics.total_return,
            total_trades: trades.len(),
            winning_trades: closing.clone().filter(|p| *p > Decimal::ZERO).count(),
            losing_trades: closing.filter(|p| *p < Decimal::ZERO).count(),
            max_drawdown: metrics.max_drawdown,
            sharpe_ratio: metrics.sharpe_ratio,
            win_rate: metrics.win_rate,
            profit_factor: metrics.profit_factor,
            steps,
        }
    }

    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        format!(
            r#"
══════════════════════════════════════════════════════
               BACKTEST RESULTS
══════════════════════════════════════════════════════

PERFORMANCE
───────────────────────────────────────────────────────
Initial Capital:  {:.2}
Final Capital:    {:.2}
Total Return:     {:+.2}%
Sharpe Ratio:     {}
Max Drawdown:     {}
Win Rate:         {}
Profit Factor:    {}

ACTIVITY
───────────────────────────────────────────────────────
Total Trades:     {}
Winning Trades:   {}
Losing Trades:    {}
Steps:            {}
══════════════════════════════════════════════════════
"#,
            self.initial_capital,
            self.final_capital,
            self.total_return * dec!(100),
            or_na(self.sharpe_ratio.map(|v| v.round_dp(2))),
            or_na(self.max_drawdown.map(pct)),
            or_na(self.win_rate.map(pct)),
            or_na(self.profit_factor.map(|v| v.round_dp(2))),
            self.total_trades,
            self.winning_trades,
            self.losing_trades,
            self.steps,
        )
    }
}

fn pct(v: Decimal) -> String {
    format!("{:.2}%", v * dec!(100))
}

fn or_na<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| v.to_string())
}
