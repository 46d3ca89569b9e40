//! Historical bar storage and the market data source contract.

use backtest_core::{validate_series, Bar, Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Supplies ordered OHLCV bars for a symbol and date range.
///
/// Implementations must return bars in strictly increasing timestamp order
/// and fail with [`Error::EmptyDataRange`] when the range holds no bars. They
/// are shared across Monte Carlo worker threads, hence `Send + Sync`.
pub trait MarketDataSource: Send + Sync {
    fn get_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>>;
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for Box<T> {
    fn get_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>> {
        (**self).get_bars(symbol, start, end)
    }
}

impl<T: MarketDataSource + ?Sized> MarketDataSource for std::sync::Arc<T> {
    fn get_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>> {
        (**self).get_bars(symbol, start, end)
    }
}

/// In-memory bar store keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBarStore {
    bars: HashMap<String, Vec<Bar>>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a series for `symbol`, replacing any previous one. Bars are
    /// validated and must already be in strictly increasing order.
    pub fn insert(&mut self, symbol: &str, bars: Vec<Bar>) -> Result<()> {
        validate_series(symbol, &bars)?;
        debug!(symbol, bars = bars.len(), "Stored bar series");
        self.bars.insert(symbol.to_string(), bars);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_series(mut self, symbol: &str, bars: Vec<Bar>) -> Result<Self> {
        self.insert(symbol, bars)?;
        Ok(self)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.bars.keys().map(String::as_str)
    }

    /// Full series for `symbol`, if stored.
    pub fn series(&self, symbol: &str) -> Option<&[Bar]> {
        self.bars.get(symbol).map(Vec::as_slice)
    }
}

impl MarketDataSource for InMemoryBarStore {
    /// Bars with `start <= timestamp <= end`.
    fn get_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>> {
        let bars: Vec<Bar> = self
            .bars
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|b| b.timestamp >= start && b.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if bars.is_empty() {
            return Err(Error::EmptyDataRange {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(bars)
    }
}
