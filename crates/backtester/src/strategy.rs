//! Signal generator contract and built-in deterministic generators.

use backtest_core::{Bar, Direction, Error, Result, Signal, SignalModel, Strategy};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Produces at most one signal per bar from two adjacent bars.
///
/// Implementations must be a pure function of their inputs so runs are
/// reproducible; stateful models should be snapshotted before a run.
pub trait SignalGenerator: Send + Sync {
    /// Get generator name.
    fn name(&self) -> &str;

    /// Signal for `curr`, given the preceding bar of the same symbol.
    fn next(&self, symbol: &str, prev: &Bar, curr: &Bar, strategy: &Strategy) -> Option<Signal>;
}

impl<T: SignalGenerator + ?Sized> SignalGenerator for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn next(&self, symbol: &str, prev: &Bar, curr: &Bar, strategy: &Strategy) -> Option<Signal> {
        (**self).next(symbol, prev, curr, strategy)
    }
}

/// Close-to-close fractional change, or `None` for a zero previous close.
fn close_change(prev: &Bar, curr: &Bar) -> Option<Decimal> {
    if prev.close.is_zero() {
        return None;
    }
    Some((curr.close - prev.close) / prev.close)
}

/// Confidence grows linearly with the move: 0.5 at the threshold, 1.0 at
/// twice the threshold.
fn move_confidence(change: Decimal, threshold: Decimal) -> f64 {
    if threshold.is_zero() {
        return 1.0;
    }
    let ratio = (change.abs() / threshold).to_f64().unwrap_or(0.0);
    (ratio / 2.0).min(1.0)
}

/// Follows moves larger than `threshold`: buy after a rise, sell after a fall.
#[derive(Debug, Clone)]
pub struct MomentumSignals {
    /// Minimum absolute close-to-close change, as a fraction.
    pub threshold: Decimal,
}

impl Default for MomentumSignals {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(1, 2), // 1%
        }
    }
}

impl SignalGenerator for MomentumSignals {
    fn name(&self) -> &str {
        "momentum"
    }

    fn next(&self, symbol: &str, prev: &Bar, curr: &Bar, _strategy: &Strategy) -> Option<Signal> {
        let change = close_change(prev, curr)?;
        if change.abs() < self.threshold {
            return None;
        }
        let direction = if change > Decimal::ZERO {
            Direction::Buy
        } else {
            Direction::Sell
        };
        Some(Signal::new(
            symbol,
            direction,
            move_confidence(change, self.threshold),
            curr.close * (Decimal::ONE + change),
            curr.close,
            curr.timestamp,
        ))
    }
}

/// Fades moves larger than `threshold`: buy after a drop, sell after a rise.
#[derive(Debug, Clone)]
pub struct MeanReversionSignals {
    pub threshold: Decimal,
}

impl Default for MeanReversionSignals {
    fn default() -> Self {
        Self {
            threshold: Decimal::new(2, 2), // 2%
        }
    }
}

impl SignalGenerator for MeanReversionSignals {
    fn name(&self) -> &str {
        "mean_reversion"
    }

    fn next(&self, symbol: &str, prev: &Bar, curr: &Bar, _strategy: &Strategy) -> Option<Signal> {
        let change = close_change(prev, curr)?;
        if change.abs() < self.threshold {
            return None;
        }
        let direction = if change > Decimal::ZERO {
            Direction::Sell
        } else {
            Direction::Buy
        };
        Some(Signal::new(
            symbol,
            direction,
            move_confidence(change, self.threshold),
            prev.close,
            curr.close,
            curr.timestamp,
        ))
    }
}

/// Generator shipped with the engine for `model`.
///
/// Learned models (LSTM, Q-learning) are trained and served elsewhere; pass
/// their [`SignalGenerator`] to the simulator directly.
pub fn builtin_generator(model: SignalModel) -> Result<Box<dyn SignalGenerator>> {
    match model {
        SignalModel::Momentum => Ok(Box::new(MomentumSignals::default())),
        SignalModel::MeanReversion => Ok(Box::new(MeanReversionSignals::default())),
        SignalModel::Lstm | SignalModel::QLearning => Err(Error::InvalidConfig(format!(
            "{} signals must be supplied by the caller",
            model
        ))),
    }
}
