//! Engine settings loaded from the environment.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Engine policy constants shared by the simulator and the Monte Carlo driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Fee charged on every trade as a fraction of notional.
    pub fee_rate: Decimal,
    /// Trades with a smaller notional value are skipped.
    pub min_trade_value: Decimal,
    /// Bars per year, used to annualize per-bar volatility and Sharpe.
    pub periods_per_year: f64,
    /// Per-bar risk-free rate used by the Sharpe and Sortino ratios.
    pub risk_free_rate: f64,
    pub monte_carlo: MonteCarloSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloSettings {
    pub iterations: usize,
    pub seed: u64,
    /// Maximum start-date shift in either direction, in days.
    pub jitter_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(1, 3),         // 0.1%
            min_trade_value: Decimal::new(10, 0), // 10 quote units
            periods_per_year: 365.0,              // daily crypto bars
            risk_free_rate: 0.0,
            monte_carlo: MonteCarloSettings::default(),
        }
    }
}

impl Default for MonteCarloSettings {
    fn default() -> Self {
        Self {
            iterations: 1000,
            seed: 42,
            jitter_days: 7,
        }
    }
}

impl Settings {
    /// Load settings from environment variables, falling back to defaults for
    /// anything unset. Malformed values are an error rather than ignored.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let settings = Self {
            fee_rate: parse_var("BACKTEST_FEE_RATE")?.unwrap_or(defaults.fee_rate),
            min_trade_value: parse_var("BACKTEST_MIN_TRADE_VALUE")?
                .unwrap_or(defaults.min_trade_value),
            periods_per_year: parse_var("BACKTEST_PERIODS_PER_YEAR")?
                .unwrap_or(defaults.periods_per_year),
            risk_free_rate: parse_var("BACKTEST_RISK_FREE_RATE")?
                .unwrap_or(defaults.risk_free_rate),
            monte_carlo: MonteCarloSettings {
                iterations: parse_var("MONTE_CARLO_ITERATIONS")?
                    .unwrap_or(defaults.monte_carlo.iterations),
                seed: parse_var("MONTE_CARLO_SEED")?.unwrap_or(defaults.monte_carlo.seed),
                jitter_days: parse_var("MONTE_CARLO_JITTER_DAYS")?
                    .unwrap_or(defaults.monte_carlo.jitter_days),
            },
        };

        tracing::debug!(?settings, "Loaded engine settings");
        Ok(settings)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| Error::Config {
            message: format!("{} has an invalid value: {:?}", name, raw),
        }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(Error::Config {
            message: format!("{} is not valid unicode", name),
        }),
    }
}
