//! Backtest records: trades, positions and portfolio snapshots

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Order side in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("BUY"),
            TradeAction::Sell => f.write_str("SELL"),
        }
    }
}

impl FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(format!("unknown trade action: {other}")),
        }
    }
}

/// An executed simulated trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: Decimal,
    pub price: Decimal,
    /// Commission charged on the notional
    pub commission: Decimal,
    /// Slippage charged on the notional
    pub slippage: Decimal,
    /// Net P&L against average cost, sells only
    pub realized_pnl: Option<Decimal>,
}

impl Trade {
    /// Quantity times price
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }

    /// Commission plus slippage
    pub fn costs(&self) -> Decimal {
        self.commission + self.slippage
    }
}

/// Held quantity of one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    /// Average cost per unit, including buy-side commission and slippage
    pub avg_cost: Decimal,
}

impl Position {
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.avg_cost) * self.quantity
    }
}

/// Portfolio state after one simulated time step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cash: Decimal,
    /// Mark-to-market value of open positions
    pub positions_value: Decimal,
    pub total_equity: Decimal,
}
