//! Error types for the backtesting engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised by a single simulation run.
///
/// Statistical boundary cases (zero-variance returns, no losing trades) are
/// defined values, not errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient cash for {symbol}: required {required}, available {available}")]
    InsufficientCash {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("No position held in {symbol}")]
    NoPosition { symbol: String },

    #[error("No bars for {symbol} between {start} and {end}")]
    EmptyDataRange {
        symbol: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar data: {0}")]
    InvalidBar(String),

    #[error("Market data source error: {0}")]
    DataSource(String),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl Error {
    /// Whether this failure came from an empty data window rather than a
    /// defect or bad input.
    pub fn is_empty_data(&self) -> bool {
        matches!(self, Error::EmptyDataRange { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
