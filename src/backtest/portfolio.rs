//! Cash and position book for the simulation

use super::types::Position;
use super::BacktestError;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// Long-only portfolio valued at the last known price per symbol
#[derive(Debug, Clone)]
pub struct Portfolio {
    cash: Decimal,
    positions: BTreeMap<String, Position>,
    last_prices: HashMap<String, Decimal>,
}

impl Portfolio {
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: BTreeMap::new(),
            last_prices: HashMap::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// Open positions by symbol
    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Held quantity, zero when flat
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Record the latest price for valuation
    pub fn mark(&mut self, symbol: &str, price: Decimal) {
        self.last_prices.insert(symbol.to_string(), price);
    }

    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_prices.get(symbol).copied()
    }

    /// Value of all positions at their last known prices
    pub fn positions_value(&self) -> Decimal {
        self.positions
            .values()
            .map(|p| {
                let price = self.last_price(&p.symbol).unwrap_or(p.avg_cost);
                p.market_value(price)
            })
            .sum()
    }

    /// Cash plus positions value
    pub fn equity(&self) -> Decimal {
        self.cash + self.positions_value()
    }

    /// Buy `quantity` at `price`, paying `costs` on top of the notional
    pub fn buy(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        costs: Decimal,
    ) -> Result<(), BacktestError> {
        if quantity <= Decimal::ZERO {
            return Err(BacktestError::InvalidQuantity(quantity));
        }
        let total = quantity * price + costs;
        if total > self.cash {
            return Err(BacktestError::InsufficientCash {
                required: total,
                available: self.cash,
            });
        }

        self.cash -= total;
        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                quantity: Decimal::ZERO,
                avg_cost: Decimal::ZERO,
            });
        let new_quantity = position.quantity + quantity;
        position.avg_cost = (position.avg_cost * position.quantity + total) / new_quantity;
        position.quantity = new_quantity;

        self.mark(symbol, price);
        Ok(())
    }

    /// Sell `quantity` at `price`, paying `costs` out of the proceeds
    ///
    /// Returns the realized P&L against average cost. A position sold down
    /// to zero is removed.
    pub fn sell(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        costs: Decimal,
    ) -> Result<Decimal, BacktestError> {
        if quantity <= Decimal::ZERO {
            return Err(BacktestError::InvalidQuantity(quantity));
        }
        let held = self.quantity(symbol);
        let Some(position) = self.positions.get_mut(symbol).filter(|_| quantity <= held) else {
            return Err(BacktestError::InsufficientPosition {
                symbol: symbol.to_string(),
                requested: quantity,
                held,
            });
        };

        let proceeds = quantity * price - costs;
        let realized = proceeds - quantity * position.avg_cost;
        position.quantity -= quantity;
        if position.quantity.is_zero() {
            self.positions.remove(symbol);
        }

        self.cash += proceeds;
        self.mark(symbol, price);
        Ok(realized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_and_sell_updates_cash_and_position() {
        let mut portfolio = Portfolio::new(dec!(1000));
        portfolio.buy("AAPL", dec!(2), dec!(100), dec!(2)).unwrap();
        assert_eq!(portfolio.cash(), dec!(798));
        assert_eq!(portfolio.quantity("AAPL"), dec!(2));
        assert_eq!(portfolio.position("AAPL").unwrap().avg_cost, dec!(101));

        portfolio.mark("AAPL", dec!(110));
        assert_eq!(portfolio.positions_value(), dec!(220));
        assert_eq!(portfolio.equity(), dec!(1018));

        let pnl = portfolio.sell("AAPL", dec!(2), dec!(110), dec!(2)).unwrap();
        assert_eq!(pnl, dec!(16));
        assert_eq!(portfolio.cash(), dec!(1016));
        assert!(portfolio.position("AAPL").is_none());
        assert_eq!(portfolio.equity(), dec!(1016));
    }

    #[test]
    fn test_average_cost_across_buys() {
        let mut portfolio = Portfolio::new(dec!(10000));
        portfolio.buy("MSFT", dec!(10), dec!(100), dec!(0)).unwrap();
        portfolio.buy("MSFT", dec!(10), dec!(200), dec!(0)).unwrap();
        assert_eq!(portfolio.position("MSFT").unwrap().avg_cost, dec!(150));
    }

    #[test]
    fn test_rejects_unaffordable_buy() {
        let mut portfolio = Portfolio::new(dec!(100));
        let err = portfolio.buy("AAPL", dec!(1), dec!(100), dec!(0.5)).unwrap_err();
        assert!(matches!(err, BacktestError::InsufficientCash { .. }));
        assert_eq!(portfolio.cash(), dec!(100));
        assert!(portfolio.positions().is_empty());
    }

    #[test]
    fn test_rejects_oversell() {
        let mut portfolio = Portfolio::new(dec!(1000));
        assert!(matches!(
            portfolio.sell("AAPL", dec!(1), dec!(10), dec!(0)),
            Err(BacktestError::InsufficientPosition { .. })
        ));

        portfolio.buy("AAPL", dec!(1), dec!(10), dec!(0)).unwrap();
        assert!(portfolio.sell("AAPL", dec!(2), dec!(10), dec!(0)).is_err());
        assert_eq!(portfolio.quantity("AAPL"), dec!(1));
    }
}
