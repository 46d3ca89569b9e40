//! Command-line interface for sim-runner
//!
//! Subcommands:
//! - `backtest`: Run one backtest over synthetic data
//! - `monte-carlo`: Run a start-date jittered batch

use anyhow::{anyhow, Result};
use backtest_core::{BacktestConfig, RiskParams, SignalModel, SlippageModel, Strategy, TradingParams};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

#[derive(Parser, Debug)]
#[command(name = "sim-runner")]
#[command(about = "Backtest and Monte Carlo runner for trading strategies")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single backtest
    Backtest(RunArgs),
    /// Run a Monte Carlo batch of jittered backtests
    MonteCarlo(MonteCarloArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModelArg {
    Momentum,
    MeanReversion,
}

impl From<ModelArg> for SignalModel {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Momentum => SignalModel::Momentum,
            ModelArg::MeanReversion => SignalModel::MeanReversion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SlippageArg {
    Fixed,
    Volume,
    Volatility,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Comma-separated symbols
    #[arg(long, value_delimiter = ',', default_value = "BTC")]
    pub symbols: Vec<String>,

    /// Window start date (YYYY-MM-DD)
    #[arg(long, default_value = "2024-01-01")]
    pub start: NaiveDate,

    /// Window length in days
    #[arg(long, default_value = "180")]
    pub days: i64,

    /// Initial capital
    #[arg(long, default_value = "10000")]
    pub capital: Decimal,

    /// Signal model
    #[arg(long, value_enum, default_value = "momentum")]
    pub model: ModelArg,

    /// Slippage model
    #[arg(long, value_enum, default_value = "fixed")]
    pub slippage: SlippageArg,

    /// Slippage fraction for the fixed model
    #[arg(long, default_value = "0.0005")]
    pub fixed_slippage: Decimal,

    /// Max position size as a fraction of portfolio value
    #[arg(long, default_value = "0.10")]
    pub max_position: Decimal,

    /// Drawdown fraction that halts the run
    #[arg(long, default_value = "0.20")]
    pub max_drawdown: f64,

    /// Minimum signal confidence
    #[arg(long, default_value = "0.6")]
    pub min_confidence: f64,

    /// Ask for a signal every N bars
    #[arg(long, default_value = "1")]
    pub rebalance_every: u32,

    /// Stop-loss fraction below average cost
    #[arg(long)]
    pub stop_loss: Option<Decimal>,

    /// Take-profit fraction above average cost
    #[arg(long)]
    pub take_profit: Option<Decimal>,

    /// Seed for the synthetic market
    #[arg(long, default_value = "42")]
    pub data_seed: u64,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl RunArgs {
    pub fn strategy(&self) -> Strategy {
        let slippage_model = match self.slippage {
            SlippageArg::Fixed => SlippageModel::Fixed(self.fixed_slippage),
            SlippageArg::Volume => SlippageModel::Volume,
            SlippageArg::Volatility => SlippageModel::Volatility,
        };
        let model = SignalModel::from(self.model);

        Strategy::new(&format!("{}-{}", model, self.symbols.join("+")), model)
            .with_risk_params(RiskParams {
                max_position_size_fraction: self.max_position,
                stop_loss_fraction: self.stop_loss,
                take_profit_fraction: self.take_profit,
                max_drawdown_limit: self.max_drawdown,
            })
            .with_trading_params(TradingParams {
                min_confidence: self.min_confidence,
                rebalance_frequency: self.rebalance_every,
                slippage_model,
            })
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    pub fn backtest_config(&self) -> Result<BacktestConfig> {
        let start = self.start_time();
        let end = Duration::try_days(self.days)
            .and_then(|span| start.checked_add_signed(span))
            .ok_or_else(|| anyhow!("--days {} is out of range", self.days))?;
        Ok(BacktestConfig::new(start, end, self.capital, self.symbols.clone()))
    }
}

#[derive(Args, Debug, Clone)]
pub struct MonteCarloArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Number of runs (defaults to MONTE_CARLO_ITERATIONS or 1000)
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Max start-date shift in days (defaults to MONTE_CARLO_JITTER_DAYS or 7)
    #[arg(long)]
    pub jitter_days: Option<i64>,

    /// Seed for window jitter (defaults to MONTE_CARLO_SEED or 42)
    #[arg(long)]
    pub seed: Option<u64>,
}
