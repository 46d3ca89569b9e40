//! Per-symbol holdings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A long holding in one symbol.
///
/// A flat position (`quantity == 0`) always has `average_cost == 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Base-asset quantity held.
    pub quantity: Decimal,
    /// Volume-weighted average entry price, excluding fees.
    pub average_cost: Decimal,
}

impl Position {
    /// Create a flat position.
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity <= Decimal::ZERO
    }

    /// Value of the holding at `price`.
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    /// Unrealized P&L at `price` against the average cost.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.average_cost) * self.quantity
    }
}
