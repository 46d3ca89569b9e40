//! Backtester
//!
//! Historical simulation and risk analytics for trading strategies.
//!
//! # Features
//!
//! - **Signal Generator Trait**: Pluggable signal source, with momentum and
//!   mean-reversion generators built in
//! - **Market Data Source**: Bar supply contract plus an in-memory store
//! - **Backtest Simulator**: Bar-by-bar portfolio simulation with slippage,
//!   fees, stop-loss/take-profit exits and a drawdown kill switch
//! - **Risk Analytics**: Sharpe, Sortino, drawdown, VaR/CVaR, profit factor
//! - **Monte Carlo**: Start-date jittered batches run in parallel
//!
//! # Example
//!
//! ```ignore
//! use backtester::{
//!     BacktestSimulator, InMemoryBarStore, MomentumSignals, MonteCarloConfig,
//!     MonteCarloDriver, SimulatorConfig,
//! };
//! use backtest_core::{BacktestConfig, SignalModel, Strategy};
//!
//! let store = InMemoryBarStore::new().with_series("BTC", bars)?;
//! let simulator = BacktestSimulator::new(store, MomentumSignals::default(), SimulatorConfig::default());
//!
//! let strategy = Strategy::new("btc-momentum", SignalModel::Momentum);
//! let config = BacktestConfig::new(start, end, dec!(10000), vec!["BTC".into()]);
//!
//! let result = simulator.run(&strategy, &config)?;
//! println!("Return: {:.2}%", result.total_return() * 100.0);
//!
//! let driver = MonteCarloDriver::new(simulator, MonteCarloConfig::default());
//! let report = driver.run(&strategy, &config)?;
//! println!("P(profit): {:.1}%", report.probability_of_profit * 100.0);
//! ```

pub mod analytics;
pub mod attribution;
pub mod data_store;
pub mod execution;
pub mod monte_carlo;
pub mod portfolio;
pub mod simulator;
pub mod strategy;

// Re-exports
pub use analytics::{DrawdownPeriod, EquityCurve, PortfolioMetrics};
pub use attribution::PerformanceAttribution;
pub use data_store::{InMemoryBarStore, MarketDataSource};
pub use execution::{ExecutionModel, ExecutionQuote};
pub use monte_carlo::{
    ConfidenceInterval, MonteCarloConfig, MonteCarloDriver, MonteCarloReport, RunFailure,
    RunSample, MAX_JITTER_DAYS,
};
pub use portfolio::{Portfolio, SellFill};
pub use simulator::{BacktestResult, BacktestSimulator, RunState, SimulatorConfig};
pub use strategy::{builtin_generator, MeanReversionSignals, MomentumSignals, SignalGenerator};
