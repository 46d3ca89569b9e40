//! Core domain types for the backtesting engine.

pub mod backtest;
pub mod bar;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod trade;

pub use backtest::*;
pub use bar::*;
pub use position::*;
pub use signal::*;
pub use strategy::*;
pub use trade::*;
