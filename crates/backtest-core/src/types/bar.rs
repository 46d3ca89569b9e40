//! OHLCV market data bars.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV sample for a fixed time interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Interval timestamp.
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Traded base-asset volume over the interval.
    pub volume: Decimal,
}

impl Bar {
    /// Create a new bar.
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar where every price equals `price`, handy for flat markets.
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal, volume: Decimal) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// High-low range as a fraction of the close.
    pub fn range_fraction(&self) -> Decimal {
        if self.close.is_zero() {
            return Decimal::ZERO;
        }
        (self.high - self.low) / self.close
    }

    /// Check prices are positive, volume is non-negative and the range is
    /// well formed.
    pub fn validate(&self) -> Result<()> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err(Error::InvalidBar(format!(
                "non-positive price in bar at {}",
                self.timestamp
            )));
        }
        if self.volume < Decimal::ZERO {
            return Err(Error::InvalidBar(format!(
                "negative volume in bar at {}",
                self.timestamp
            )));
        }
        if self.high < self.low {
            return Err(Error::InvalidBar(format!(
                "high below low in bar at {}",
                self.timestamp
            )));
        }
        Ok(())
    }
}

/// Validate every bar of a series and check timestamps strictly increase.
pub fn validate_series(symbol: &str, bars: &[Bar]) -> Result<()> {
    for bar in bars {
        bar.validate()?;
    }
    if let Some(w) = bars.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
        return Err(Error::InvalidBar(format!(
            "{} timestamps not strictly increasing at {}",
            symbol, w[1].timestamp
        )));
    }
    Ok(())
}
