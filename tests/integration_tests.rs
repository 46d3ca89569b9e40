//! Integration tests for component interactions.
//!
//! These tests verify that the core types, simulator, analytics and Monte
//! Carlo driver work together correctly.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use backtest_core::{
    BacktestConfig, Bar, Direction, Error, Settings, Signal, SignalModel, SlippageModel, Strategy,
    TradeType,
};
use backtester::{
    builtin_generator, BacktestSimulator, InMemoryBarStore, MomentumSignals, MonteCarloConfig,
    MonteCarloDriver, RunState, SignalGenerator, SimulatorConfig,
};

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

fn random_walk(seed: u64, count: i64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut close = 20_000i64;
    (0..count)
        .map(|i| {
            let open = close;
            close = (close + rng.gen_range(-600..620)).max(1_000);
            Bar::new(
                day(i),
                Decimal::new(open, 2),
                Decimal::new(open.max(close) + 50, 2),
                Decimal::new(open.min(close) - 50, 2),
                Decimal::new(close, 2),
                Decimal::new(rng.gen_range(100..2000), 0),
            )
        })
        .collect()
}

fn active_strategy() -> Strategy {
    let mut strategy = Strategy::new("integration", SignalModel::Momentum);
    strategy.trading_params.min_confidence = 0.2;
    strategy.risk_params.max_position_size_fraction = Decimal::new(25, 2);
    strategy.risk_params.max_drawdown_limit = 0.9;
    strategy
}

/// Buys once on a given day; stands in for a caller-supplied learned model.
struct OneShot(DateTime<Utc>);

impl SignalGenerator for OneShot {
    fn name(&self) -> &str {
        "one-shot"
    }

    fn next(&self, symbol: &str, _prev: &Bar, curr: &Bar, _strategy: &Strategy) -> Option<Signal> {
        (curr.timestamp == self.0).then(|| {
            Signal::new(symbol, Direction::Buy, 1.0, curr.close, curr.close, curr.timestamp)
        })
    }
}

/// Test that settings flow into the simulator configuration.
#[test]
fn test_settings_drive_simulator_config() {
    let settings = Settings {
        fee_rate: Decimal::new(2, 3),
        min_trade_value: Decimal::new(50, 0),
        ..Settings::default()
    };
    let config = SimulatorConfig::from_settings(&settings);

    assert_eq!(config.execution.fee_rate, Decimal::new(2, 3));
    assert_eq!(config.min_trade_value, Decimal::new(50, 0));
    assert_eq!(config.periods_per_year, 365.0);
    assert!(config.validate().is_ok());

    let mc = MonteCarloConfig::from_settings(&settings);
    assert_eq!(mc.iterations, 1000);
    assert_eq!(mc.jitter(), Some(Duration::days(7)));
}

/// Test a single buy on flat prices costs exactly the fee.
#[test]
fn test_single_buy_costs_only_fees() {
    let bars: Vec<Bar> = (0..10)
        .map(|i| Bar::flat(day(i), Decimal::new(250, 0), Decimal::new(1000, 0)))
        .collect();
    let store = InMemoryBarStore::new().with_series("ETH", bars).unwrap();

    let mut strategy = Strategy::new("flat", SignalModel::Lstm);
    strategy.trading_params.slippage_model = SlippageModel::Fixed(Decimal::ZERO);

    let simulator = BacktestSimulator::new(store, OneShot(day(3)), SimulatorConfig::default());
    let config = BacktestConfig::new(day(0), day(9), Decimal::new(10_000, 0), vec!["ETH".into()]);
    let result = simulator.run(&strategy, &config).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.trade_type, TradeType::Buy);
    assert_eq!(trade.notional(), Decimal::new(1000, 0));
    assert_eq!(result.final_value(), Decimal::new(10_000, 0) - trade.fees);
    assert!(!result.is_profitable());
}

/// Test learned models must be supplied by the caller.
#[test]
fn test_learned_models_are_not_builtin() {
    assert!(matches!(
        builtin_generator(SignalModel::QLearning),
        Err(Error::InvalidConfig(_))
    ));
    assert!(builtin_generator(SignalModel::MeanReversion).is_ok());
}

/// Test a full run keeps analytics and attribution consistent with trades.
#[test]
fn test_run_metrics_match_trade_list() {
    let store = InMemoryBarStore::new()
        .with_series("BTC", random_walk(1, 365))
        .unwrap()
        .with_series("ETH", random_walk(2, 365))
        .unwrap();
    let simulator = BacktestSimulator::new(
        store,
        builtin_generator(SignalModel::Momentum).unwrap(),
        SimulatorConfig::default(),
    );
    let config = BacktestConfig::new(
        day(0),
        day(364),
        Decimal::new(50_000, 0),
        vec!["BTC".into(), "ETH".into()],
    );
    let result = simulator.run(&active_strategy(), &config).unwrap();

    assert_eq!(result.state, RunState::Completed);
    assert!(!result.trades.is_empty());
    assert_eq!(result.equity_curve.len(), 366);
    assert_eq!(result.bars_processed, 730);

    let m = &result.metrics;
    assert_eq!(m.total_trades, result.trades.len());
    assert_eq!(m.initial_value, Decimal::new(50_000, 0));
    assert_eq!(m.final_value, result.equity_curve.last().unwrap().1);
    assert_eq!(m.total_fees, result.attribution.fee_impact);
    assert_eq!(m.total_slippage, result.attribution.slippage_impact);
    assert!(m.max_drawdown >= 0.0 && m.max_drawdown <= 100.0);
    assert!(m.win_rate >= 0.0 && m.win_rate <= 1.0);

    let ids: Vec<u64> = result.trades.iter().map(|t| t.id).collect();
    assert_eq!(ids, (1..=result.trades.len() as u64).collect::<Vec<_>>());
    assert!(result.trades.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let realized: Decimal = result.trades.iter().map(|t| t.pnl).sum();
    assert_eq!(result.attribution.realized_pnl, realized);
    assert!(result.format_table().contains("integration"));
}

/// Test a crash trips the drawdown limit and truncates the run.
#[test]
fn test_crash_trips_drawdown_limit() {
    let closes = [100, 100, 100, 70, 50, 40, 40, 40];
    let bars: Vec<Bar> = closes
        .iter()
        .enumerate()
        .map(|(i, c)| Bar::flat(day(i as i64), Decimal::new(*c, 0), Decimal::new(1000, 0)))
        .collect();
    let store = InMemoryBarStore::new().with_series("SOL", bars).unwrap();

    let mut strategy = Strategy::new("crash", SignalModel::Momentum);
    strategy.risk_params.max_position_size_fraction = Decimal::ONE;
    strategy.risk_params.max_drawdown_limit = 0.10;

    let simulator = BacktestSimulator::new(store, OneShot(day(1)), SimulatorConfig::default());
    let config = BacktestConfig::new(day(0), day(7), Decimal::new(10_000, 0), vec!["SOL".into()]);
    let result = simulator.run(&strategy, &config).unwrap();

    assert_eq!(result.state, RunState::StoppedByRiskLimit);
    // initial point plus days 0..=3
    assert_eq!(result.equity_curve.len(), 5);
    assert!(result.metrics.max_drawdown > 10.0);
    assert!(!result.drawdown_periods.is_empty());
    assert!(!result.drawdown_periods[0].recovered);
}

/// Test a Monte Carlo batch reports short-window failures without dropping them.
#[test]
fn test_monte_carlo_partial_failures() {
    let store = InMemoryBarStore::new()
        .with_series("BTC", random_walk(3, 60))
        .unwrap();
    let simulator = BacktestSimulator::new(store, MomentumSignals::default(), SimulatorConfig::default());
    let driver = MonteCarloDriver::new(
        simulator,
        MonteCarloConfig {
            iterations: 100,
            jitter_days: 30,
            seed: 5,
        },
    );

    // Data covers days 0..60; a 5-day window jittered by up to 30 days can
    // land entirely outside it.
    let config = BacktestConfig::new(day(-10), day(-5), Decimal::new(10_000, 0), vec!["BTC".into()]);
    let report = driver.run(&active_strategy(), &config).unwrap();

    assert_eq!(report.iterations, 100);
    assert_eq!(report.successful_runs + report.failed_runs, 100);
    assert!(report.failed_runs > 0);
    assert!(report.successful_runs > 0);
    assert!(report.failures.iter().all(|f| f.error.is_empty_data()));
    assert!(report.failures.iter().all(|f| f.end < day(0)));
    assert!(report.probability_of_profit >= 0.0 && report.probability_of_profit <= 1.0);
}

/// Test results serialize with the documented field names.
#[test]
fn test_result_serializes_to_json() {
    let store = InMemoryBarStore::new()
        .with_series("BTC", random_walk(9, 30))
        .unwrap();
    let simulator = BacktestSimulator::new(store, MomentumSignals::default(), SimulatorConfig::default());
    let config = BacktestConfig::new(day(0), day(29), Decimal::new(10_000, 0), vec!["BTC".into()]);
    let result = simulator.run(&active_strategy(), &config).unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["state"], "completed");
    assert!(json["equity_curve"].is_array());
    assert!(json["metrics"]["annualized_sharpe"].is_number());
    assert!(json["attribution"]["signal_accuracy"].is_number());
}
