//! Virtual portfolio: cash and per-symbol position bookkeeping.

use backtest_core::{Error, Position, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Outcome of a sell applied to the portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SellFill {
    /// Quantity actually sold, capped at the holding.
    pub quantity: Decimal,
    /// `(price - average_cost) * quantity - fees`.
    pub realized_pnl: Decimal,
    /// Cash credited: `quantity * price - fees`.
    pub proceeds: Decimal,
}

/// Cash plus long positions. Positions are kept in a `BTreeMap` so iteration
/// order, and therefore valuation, is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    cash: Decimal,
    positions: BTreeMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
        }
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Quantity currently held in `symbol` (zero when flat or unknown).
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Buy `quantity` at `price`, paying `fees` on top.
    ///
    /// Fails with [`Error::InsufficientCash`] without touching state if the
    /// total cost exceeds available cash.
    pub fn apply_buy(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Result<()> {
        let cost = quantity * price + fees;
        if cost > self.cash {
            return Err(Error::InsufficientCash {
                symbol: symbol.to_string(),
                required: cost,
                available: self.cash,
            });
        }

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol));

        let new_quantity = position.quantity + quantity;
        if new_quantity > Decimal::ZERO {
            position.average_cost =
                (position.quantity * position.average_cost + quantity * price) / new_quantity;
        }
        position.quantity = new_quantity;
        self.cash -= cost;
        Ok(())
    }

    /// Sell up to `quantity` at `price`, paying `fees` out of the proceeds.
    ///
    /// The sold quantity is capped at the holding. A position that ends flat
    /// has its cost basis reset. Fails with [`Error::NoPosition`] if nothing
    /// is held.
    pub fn apply_sell(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        fees: Decimal,
    ) -> Result<SellFill> {
        let position = match self.positions.get_mut(symbol) {
            Some(p) if !p.is_flat() => p,
            _ => {
                return Err(Error::NoPosition {
                    symbol: symbol.to_string(),
                })
            }
        };

        let sold = quantity.min(position.quantity);
        let realized_pnl = (price - position.average_cost) * sold - fees;
        let proceeds = sold * price - fees;

        position.quantity -= sold;
        if position.quantity <= Decimal::ZERO {
            position.quantity = Decimal::ZERO;
            position.average_cost = Decimal::ZERO;
        }
        self.cash += proceeds;

        Ok(SellFill {
            quantity: sold,
            realized_pnl,
            proceeds,
        })
    }

    /// Total value at the given prices: cash plus every holding marked at its
    /// symbol's price. Holdings without a quote are carried at cost.
    pub fn mark_to_market(&self, prices: &HashMap<String, Decimal>) -> Decimal {
        let holdings: Decimal = self
            .positions
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| {
                let price = prices.get(&p.symbol).copied().unwrap_or(p.average_cost);
                p.market_value(price)
            })
            .sum();
        self.cash + holdings
    }
}
