//! Backtest run configuration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Window, capital and universe for one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub initial_capital: Decimal,
    pub symbols: Vec<String>,
}

impl BacktestConfig {
    /// Create a new backtest configuration.
    pub fn new(
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        initial_capital: Decimal,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital,
            symbols,
        }
    }

    /// Same configuration over a window shifted by `offset`. Fails with
    /// [`Error::InvalidConfig`] if either date leaves the representable range.
    pub fn shifted(&self, offset: chrono::Duration) -> Result<Self> {
        let shift = |date: DateTime<Utc>| {
            date.checked_add_signed(offset).ok_or_else(|| {
                Error::InvalidConfig(format!("{} shifted by {} is out of range", date, offset))
            })
        };
        Ok(Self {
            start_date: shift(self.start_date)?,
            end_date: shift(self.end_date)?,
            ..self.clone()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.end_date <= self.start_date {
            return Err(Error::InvalidConfig(format!(
                "end_date {} must be after start_date {}",
                self.end_date, self.start_date
            )));
        }
        if self.symbols.is_empty() {
            return Err(Error::InvalidConfig("at least one symbol is required".to_string()));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(Error::InvalidConfig("symbols must not be blank".to_string()));
        }
        Ok(())
    }
}
