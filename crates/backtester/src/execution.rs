//! Execution model: slippage and fee pricing for simulated fills.

use backtest_core::{Bar, Direction, SlippageModel};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cap on volume-based slippage.
const MAX_VOLUME_SLIPPAGE: Decimal = Decimal::from_parts(1, 0, 0, false, 2); // 1%
/// Cap on volatility-based slippage.
const MAX_VOLATILITY_SLIPPAGE: Decimal = Decimal::from_parts(2, 0, 0, false, 2); // 2%
/// Share of the bar range charged as volatility slippage.
const VOLATILITY_SLIPPAGE_SCALE: Decimal = Decimal::from_parts(1, 0, 0, false, 1); // 0.1

/// Price and slippage for one hypothetical fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionQuote {
    /// Price after slippage.
    pub price: Decimal,
    /// Slippage applied to the reference close, as a fraction.
    pub slippage: Decimal,
}

/// Prices simulated trades against a reference bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionModel {
    /// Fee as a fraction of notional, charged on every trade.
    pub fee_rate: Decimal,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(1, 3), // 0.1%
        }
    }
}

impl ExecutionModel {
    pub fn new(fee_rate: Decimal) -> Self {
        Self { fee_rate }
    }

    /// Slippage fraction for a fill against `bar` under `model`.
    pub fn slippage(&self, bar: &Bar, model: &SlippageModel) -> Decimal {
        match model {
            SlippageModel::Fixed(pct) => *pct,
            SlippageModel::Volume => {
                let depth = bar.volume.max(Decimal::ONE);
                (Decimal::ONE / depth).min(MAX_VOLUME_SLIPPAGE)
            }
            SlippageModel::Volatility => {
                (VOLATILITY_SLIPPAGE_SCALE * bar.range_fraction()).min(MAX_VOLATILITY_SLIPPAGE)
            }
        }
    }

    /// Execution price for `direction` at the bar close. Buys pay up, sells
    /// give up the slippage.
    pub fn price(&self, direction: Direction, bar: &Bar, model: &SlippageModel) -> ExecutionQuote {
        let slippage = self.slippage(bar, model);
        let price = match direction {
            Direction::Buy => bar.close * (Decimal::ONE + slippage),
            Direction::Sell => bar.close * (Decimal::ONE - slippage),
        };
        ExecutionQuote { price, slippage }
    }

    /// Fee charged on a trade of `notional` quote value.
    pub fn fee(&self, notional: Decimal) -> Decimal {
        notional * self.fee_rate
    }
}
