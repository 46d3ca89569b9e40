//! Seeded synthetic market data.

use backtest_core::{Bar, Result};
use backtester::InMemoryBarStore;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Geometric random walk generator for daily OHLCV bars.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    pub seed: u64,
    pub start_price: f64,
    /// Mean log return per bar.
    pub drift: f64,
    /// Standard deviation of log returns per bar.
    pub volatility: f64,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            seed: 42,
            start_price: 100.0,
            drift: 0.0005,
            volatility: 0.03,
        }
    }
}

impl RandomWalk {
    /// `count` daily bars for `symbol` starting at `start`. The same seed and
    /// symbol always produce the same series.
    pub fn bars(&self, symbol: &str, start: DateTime<Utc>, count: usize) -> Vec<Bar> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ symbol_salt(symbol));
        let mut bars = Vec::with_capacity(count);
        let mut prev_close = self.start_price;

        for i in 0..count {
            let z = standard_normal(&mut rng);
            let log_return = self.drift - self.volatility * self.volatility / 2.0 + self.volatility * z;
            let close = prev_close * log_return.exp();
            let open = prev_close;

            let wick = self.volatility / 2.0;
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..wick));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..wick));
            let volume = rng.gen_range(500.0..5000.0);

            bars.push(Bar::new(
                start + Duration::days(i as i64),
                to_decimal(open),
                to_decimal(high),
                to_decimal(low),
                to_decimal(close),
                to_decimal(volume),
            ));
            prev_close = close;
        }

        bars
    }

    /// Build a store holding `count` bars per symbol.
    pub fn store(&self, symbols: &[String], start: DateTime<Utc>, count: usize) -> Result<InMemoryBarStore> {
        let mut store = InMemoryBarStore::new();
        for symbol in symbols {
            store.insert(symbol, self.bars(symbol, start, count))?;
        }
        Ok(store)
    }
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>(); // (0, 1]
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// FNV-1a, so each symbol walks its own path under one seed.
fn symbol_salt(symbol: &str) -> u64 {
    symbol.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).round_dp(6)
}
