//! Performance attribution: where a run's realized return came from.

use backtest_core::{Trade, TradeType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decomposition of realized P&L into signal quality and execution costs.
///
/// Used to check that a strategy's apparent edge survives realistic slippage
/// and fees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAttribution {
    /// Trades that carry an originating signal.
    pub signal_trades: usize,
    /// Signal trades whose fill moved in the signalled direction.
    pub correct_signals: usize,
    /// `correct_signals / signal_trades`; 0 with no signal trades.
    pub signal_accuracy: f64,
    /// `sum(slippage * amount * price)` over all trades.
    pub slippage_impact: Decimal,
    /// Sum of fees over all trades.
    pub fee_impact: Decimal,
    /// Sum of realized P&L over all trades.
    pub realized_pnl: Decimal,
}

impl PerformanceAttribution {
    /// Attribute a run's trade list.
    pub fn from_trades(trades: &[Trade]) -> Self {
        let mut signal_trades = 0;
        let mut correct_signals = 0;

        for trade in trades {
            let Some(signal) = &trade.signal else {
                continue;
            };
            signal_trades += 1;
            let correct = match trade.trade_type {
                TradeType::Buy => trade.price > signal.current_price,
                TradeType::Sell => trade.price < signal.current_price,
            };
            if correct {
                correct_signals += 1;
            }
        }

        let signal_accuracy = if signal_trades > 0 {
            correct_signals as f64 / signal_trades as f64
        } else {
            0.0
        };

        Self {
            signal_trades,
            correct_signals,
            signal_accuracy,
            slippage_impact: trades.iter().map(Trade::slippage_cost).sum(),
            fee_impact: trades.iter().map(|t| t.fees).sum(),
            realized_pnl: trades.iter().map(|t| t.pnl).sum(),
        }
    }

    /// Realized P&L with execution costs added back.
    pub fn pnl_before_costs(&self) -> Decimal {
        self.realized_pnl + self.fee_impact + self.slippage_impact
    }
}
