//! Trade signals produced by pluggable signal generators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a signal or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// A trade signal for one bar. Generators return `Option<Signal>`; the absent
/// case means "no opinion on this bar".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f64,
    /// Price the generator expects the market to move to.
    pub predicted_price: Decimal,
    /// Market price when the signal was produced.
    pub current_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a new signal. Confidence is clamped into [0, 1].
    pub fn new(
        symbol: &str,
        direction: Direction,
        confidence: f64,
        predicted_price: Decimal,
        current_price: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            symbol: symbol.to_string(),
            direction,
            confidence,
            predicted_price,
            current_price,
            timestamp,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.direction == Direction::Buy
    }
}
