//! Executed trade records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Direction, Signal};

/// Type of trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeType {
    Buy,
    Sell,
}

impl From<Direction> for TradeType {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Buy => TradeType::Buy,
            Direction::Sell => TradeType::Sell,
        }
    }
}

/// Why a position was closed without a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

/// Record of a simulated fill. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Sequence number within the run, starting at 1.
    pub id: u64,
    pub symbol: String,
    pub trade_type: TradeType,
    /// Base-asset quantity.
    pub amount: Decimal,
    /// Execution price after slippage.
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Realized P&L net of this trade's fees; zero for buys.
    pub pnl: Decimal,
    pub fees: Decimal,
    /// Slippage applied to the reference close, as a fraction.
    pub slippage: Decimal,
    /// Set when a stop-loss or take-profit closed the position.
    pub exit_reason: Option<ExitReason>,
    /// Signal that triggered the trade; `None` for forced exits.
    pub signal: Option<Signal>,
}

impl Trade {
    /// Notional value at execution price.
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }

    /// Quote-currency cost of slippage on this fill.
    pub fn slippage_cost(&self) -> Decimal {
        self.slippage * self.amount * self.price
    }

    pub fn is_winner(&self) -> bool {
        self.pnl > Decimal::ZERO
    }

    pub fn is_loser(&self) -> bool {
        self.pnl < Decimal::ZERO
    }
}
