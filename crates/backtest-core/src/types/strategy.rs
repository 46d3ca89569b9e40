//! Strategy definitions consumed by the simulator.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which signal source a strategy trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalModel {
    /// Follows close-to-close moves.
    Momentum,
    /// Fades close-to-close moves.
    MeanReversion,
    /// Recurrent price predictor; supplied by the caller.
    Lstm,
    /// Reinforcement-learning policy; supplied by the caller.
    QLearning,
}

impl SignalModel {
    /// Get human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SignalModel::Momentum => "Momentum",
            SignalModel::MeanReversion => "Mean Reversion",
            SignalModel::Lstm => "LSTM",
            SignalModel::QLearning => "Q-Learning",
        }
    }

    /// Whether the engine ships a generator for this model.
    pub fn is_builtin(&self) -> bool {
        matches!(self, SignalModel::Momentum | SignalModel::MeanReversion)
    }
}

impl std::fmt::Display for SignalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Slippage policy used to price simulated fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageModel {
    /// Constant slippage fraction.
    Fixed(Decimal),
    /// `min(0.01, 1 / max(1, volume))`: deeper bars fill tighter.
    Volume,
    /// `min(0.02, 0.1 * (high - low) / close)`: wider bars fill worse.
    Volatility,
}

impl Default for SlippageModel {
    fn default() -> Self {
        SlippageModel::Fixed(Decimal::new(5, 4)) // 0.05%
    }
}

/// Position sizing and loss limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Maximum single position value as a fraction of portfolio value, in (0, 1].
    pub max_position_size_fraction: Decimal,
    /// Exit a position once its close falls this fraction below average cost.
    #[serde(default)]
    pub stop_loss_fraction: Option<Decimal>,
    /// Exit a position once its close rises this fraction above average cost.
    #[serde(default)]
    pub take_profit_fraction: Option<Decimal>,
    /// Halt the run once drawdown from peak equity exceeds this fraction.
    pub max_drawdown_limit: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            max_position_size_fraction: Decimal::new(10, 2), // 10%
            stop_loss_fraction: None,
            take_profit_fraction: None,
            max_drawdown_limit: 0.20,
        }
    }
}

/// Signal filtering and execution assumptions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingParams {
    /// Signals below this confidence are ignored.
    pub min_confidence: f64,
    /// Ask for a signal every N bars.
    pub rebalance_frequency: u32,
    #[serde(default)]
    pub slippage_model: SlippageModel,
}

impl Default for TradingParams {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
            rebalance_frequency: 1,
            slippage_model: SlippageModel::default(),
        }
    }
}

/// A named trading strategy under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub signal_model: SignalModel,
    pub risk_params: RiskParams,
    pub trading_params: TradingParams,
}

impl Strategy {
    /// Create a strategy with default risk and trading parameters.
    pub fn new(name: &str, signal_model: SignalModel) -> Self {
        Self {
            name: name.to_string(),
            signal_model,
            risk_params: RiskParams::default(),
            trading_params: TradingParams::default(),
        }
    }

    pub fn with_risk_params(mut self, risk_params: RiskParams) -> Self {
        self.risk_params = risk_params;
        self
    }

    pub fn with_trading_params(mut self, trading_params: TradingParams) -> Self {
        self.trading_params = trading_params;
        self
    }

    /// Reject parameter combinations the simulator cannot honour.
    pub fn validate(&self) -> Result<()> {
        let risk = &self.risk_params;
        let trading = &self.trading_params;

        if risk.max_position_size_fraction <= Decimal::ZERO
            || risk.max_position_size_fraction > Decimal::ONE
        {
            return Err(Error::InvalidConfig(format!(
                "max_position_size_fraction must be in (0, 1], got {}",
                risk.max_position_size_fraction
            )));
        }
        if !(risk.max_drawdown_limit > 0.0 && risk.max_drawdown_limit <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "max_drawdown_limit must be in (0, 1], got {}",
                risk.max_drawdown_limit
            )));
        }
        for (name, value) in [
            ("stop_loss_fraction", risk.stop_loss_fraction),
            ("take_profit_fraction", risk.take_profit_fraction),
        ] {
            if let Some(v) = value {
                if v <= Decimal::ZERO {
                    return Err(Error::InvalidConfig(format!(
                        "{} must be positive, got {}",
                        name, v
                    )));
                }
            }
        }
        if let Some(sl) = risk.stop_loss_fraction {
            if sl >= Decimal::ONE {
                return Err(Error::InvalidConfig(format!(
                    "stop_loss_fraction must be below 1, got {}",
                    sl
                )));
            }
        }
        if !(0.0..=1.0).contains(&trading.min_confidence) {
            return Err(Error::InvalidConfig(format!(
                "min_confidence must be in [0, 1], got {}",
                trading.min_confidence
            )));
        }
        if trading.rebalance_frequency == 0 {
            return Err(Error::InvalidConfig(
                "rebalance_frequency must be at least 1".to_string(),
            ));
        }
        if let SlippageModel::Fixed(pct) = trading.slippage_model {
            if pct < Decimal::ZERO || pct >= Decimal::ONE {
                return Err(Error::InvalidConfig(format!(
                    "fixed slippage must be in [0, 1), got {}",
                    pct
                )));
            }
        }
        Ok(())
    }
}
