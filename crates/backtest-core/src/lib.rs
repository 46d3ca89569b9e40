//! Backtest Core Library
//!
//! Shared domain types, error handling, and settings for the strategy
//! backtesting engine: market bars, strategy signals, strategy and run
//! configuration, positions, and trade records.

pub mod config;
pub mod error;
pub mod types;

pub use config::{MonteCarloSettings, Settings};
pub use error::{Error, Result};
pub use types::*;
