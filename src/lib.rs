//! Strategy Lab: backtesting and portfolio-risk simulation for trading strategies
//!
//! This is the root crate that provides benchmark and integration-test access
//! to the workspace. For actual functionality, use the individual crates directly:
//!
//! - `backtest-core`: Bars, signals, strategies, trades, errors, settings
//! - `backtester`: Simulator, portfolio, execution model, risk analytics,
//!   attribution, Monte Carlo driver
//! - `sim-runner`: CLI over synthetic market data

// Re-export for benchmarks
pub use backtest_core as core;
pub use backtester as engine;
