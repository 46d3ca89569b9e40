//! Backtest simulator: replays bars through a signal generator into a
//! virtual portfolio.

use backtest_core::{
    validate_series, BacktestConfig, Bar, Direction, Error, ExitReason, Result, Settings, Signal,
    Strategy, Trade, TradeType,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use crate::analytics::{drawdown_periods, DrawdownPeriod, EquityCurve, PortfolioMetrics};
use crate::attribution::PerformanceAttribution;
use crate::data_store::MarketDataSource;
use crate::execution::ExecutionModel;
use crate::portfolio::Portfolio;
use crate::strategy::SignalGenerator;

/// Configuration for the backtest simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Fee and slippage pricing.
    pub execution: ExecutionModel,
    /// Trades below this notional are skipped.
    pub min_trade_value: Decimal,
    /// Share of cash (buys) or holding value (sells) a single trade may use.
    pub cash_buffer: Decimal,
    /// Bars per year, for annualized metrics.
    pub periods_per_year: f64,
    /// Per-bar risk-free rate.
    pub risk_free_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionModel::default(),
            min_trade_value: Decimal::new(10, 0),
            cash_buffer: Decimal::new(95, 2), // 95%
            periods_per_year: 365.0,
            risk_free_rate: 0.0,
        }
    }
}

impl SimulatorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            execution: ExecutionModel::new(settings.fee_rate),
            min_trade_value: settings.min_trade_value,
            periods_per_year: settings.periods_per_year,
            risk_free_rate: settings.risk_free_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Buys spend at most cash_buffer * cash plus its fee, which must fit.
        let worst_case_spend = self.cash_buffer * (Decimal::ONE + self.execution.fee_rate);
        if self.execution.fee_rate < Decimal::ZERO || worst_case_spend > Decimal::ONE {
            return Err(Error::InvalidConfig(format!(
                "fee_rate {} with cash_buffer {} can overdraw cash",
                self.execution.fee_rate, self.cash_buffer
            )));
        }
        if self.cash_buffer <= Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "cash_buffer must be positive, got {}",
                self.cash_buffer
            )));
        }
        if self.min_trade_value < Decimal::ZERO {
            return Err(Error::InvalidConfig(format!(
                "min_trade_value must not be negative, got {}",
                self.min_trade_value
            )));
        }
        if !(self.periods_per_year > 0.0 && self.periods_per_year.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }
        Ok(())
    }
}

/// Lifecycle of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initialized,
    Running,
    /// Every bar was processed.
    Completed,
    /// Drawdown exceeded the strategy limit; results cover bars up to the stop.
    StoppedByRiskLimit,
}

/// Result of a backtest run. Built once, never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: RunState,
    /// Bars consumed before the run ended.
    pub bars_processed: usize,
    pub trades: Vec<Trade>,
    /// Starts with the initial capital at `start_time`, then one point per
    /// processed timestamp. Sources return bars from `start_time` inclusive,
    /// so a bar stamped exactly at `start_time` repeats that timestamp in the
    /// second point.
    pub equity_curve: EquityCurve,
    pub metrics: PortfolioMetrics,
    pub drawdown_periods: Vec<DrawdownPeriod>,
    pub attribution: PerformanceAttribution,
}

impl BacktestResult {
    pub fn final_value(&self) -> Decimal {
        self.metrics.final_value
    }

    pub fn total_return(&self) -> f64 {
        self.metrics.total_return
    }

    /// Check if the backtest was profitable.
    pub fn is_profitable(&self) -> bool {
        self.metrics.final_value > self.metrics.initial_value
    }

    pub fn stopped_early(&self) -> bool {
        self.state == RunState::StoppedByRiskLimit
    }

    /// Format as table for CLI output.
    pub fn format_table(&self) -> String {
        let m = &self.metrics;
        let a = &self.attribution;
        format!(
            r#"
══════════════════════════════════════════════════════
  BACKTEST: {}
══════════════════════════════════════════════════════
Window:           {} -> {}
State:            {:?} ({} bars)

PERFORMANCE
──────────────────────────────────────────────────────
Final Value:      {:.2}
Total Return:     {:+.2}%
Sharpe (annual):  {:.2}
Sortino:          {:.2}
Volatility (ann): {:.2}%
Max Drawdown:     {:.2}%
VaR 95 / CVaR 95: {:.2}% / {:.2}%
Win Rate:         {:.1}%
Profit Factor:    {:.2}

ATTRIBUTION
──────────────────────────────────────────────────────
Trades:           {} ({} from signals)
Signal Accuracy:  {:.1}%
Realized P&L:     {:.2}
Fees:             {:.2}
Slippage:         {:.2}
══════════════════════════════════════════════════════
"#,
            self.strategy_name,
            self.start_time,
            self.end_time,
            self.state,
            self.bars_processed,
            m.final_value,
            m.total_return * 100.0,
            m.annualized_sharpe,
            m.sortino_ratio,
            m.annualized_volatility * 100.0,
            m.max_drawdown,
            m.var_95 * 100.0,
            m.cvar_95 * 100.0,
            m.win_rate * 100.0,
            m.profit_factor,
            m.total_trades,
            a.signal_trades,
            a.signal_accuracy * 100.0,
            a.realized_pnl,
            a.fee_impact,
            a.slippage_impact,
        )
    }
}

/// Working state owned by a single run.
struct SimulationState {
    state: RunState,
    portfolio: Portfolio,
    last_close: HashMap<String, Decimal>,
    trades: Vec<Trade>,
    equity_curve: EquityCurve,
    peak_equity: Decimal,
    bars_processed: usize,
    next_trade_id: u64,
}

impl SimulationState {
    fn new(initial_capital: Decimal, start: DateTime<Utc>) -> Self {
        Self {
            state: RunState::Initialized,
            portfolio: Portfolio::new(initial_capital),
            last_close: HashMap::new(),
            trades: Vec::new(),
            equity_curve: vec![(start, initial_capital)],
            peak_equity: initial_capital,
            bars_processed: 0,
            next_trade_id: 1,
        }
    }

    fn portfolio_value(&self) -> Decimal {
        self.portfolio.mark_to_market(&self.last_close)
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "Run state transition");
        self.state = next;
    }

    fn record(&mut self, mut trade: Trade) {
        trade.id = self.next_trade_id;
        self.next_trade_id += 1;
        self.trades.push(trade);
    }
}

/// The backtest simulator engine.
///
/// Runs are single-threaded and strictly sequential in bar order. The
/// simulator holds no mutable state, so one instance can serve many runs
/// concurrently.
pub struct BacktestSimulator<D, G> {
    config: SimulatorConfig,
    data_source: D,
    signals: G,
}

impl<D: MarketDataSource, G: SignalGenerator> BacktestSimulator<D, G> {
    /// Create a new backtest simulator.
    pub fn new(data_source: D, signals: G, config: SimulatorConfig) -> Self {
        Self {
            config,
            data_source,
            signals,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Run a backtest of `strategy` over the window and universe in `backtest`.
    pub fn run(&self, strategy: &Strategy, backtest: &BacktestConfig) -> Result<BacktestResult> {
        backtest.validate()?;
        strategy.validate()?;
        self.config.validate()?;

        info!(
            strategy = %strategy.name,
            signals = self.signals.name(),
            start = %backtest.start_date,
            end = %backtest.end_date,
            symbols = backtest.symbols.len(),
            "Starting backtest"
        );

        let series = self.load_series(backtest)?;
        let timeline = build_timeline(&series);

        let mut state = SimulationState::new(backtest.initial_capital, backtest.start_date);
        state.transition(RunState::Running);

        'bars: for (timestamp, entries) in &timeline {
            for &(symbol, idx) in entries {
                let bars = &series[symbol];
                self.process_bar(strategy, symbol, bars, idx, &mut state)?;
            }

            let value = state.portfolio_value();
            state.equity_curve.push((*timestamp, value));

            if value > state.peak_equity {
                state.peak_equity = value;
            }
            let drawdown = ((state.peak_equity - value) / state.peak_equity)
                .to_f64()
                .unwrap_or(0.0);
            if drawdown > strategy.risk_params.max_drawdown_limit {
                warn!(
                    strategy = %strategy.name,
                    at = %timestamp,
                    drawdown,
                    limit = strategy.risk_params.max_drawdown_limit,
                    "Drawdown limit breached, stopping run"
                );
                state.transition(RunState::StoppedByRiskLimit);
                break 'bars;
            }
        }

        if state.state == RunState::Running {
            state.transition(RunState::Completed);
        }

        let result = self.build_result(strategy, backtest, state);

        info!(
            strategy = %result.strategy_name,
            state = ?result.state,
            return_pct = result.metrics.total_return * 100.0,
            sharpe = result.metrics.annualized_sharpe,
            trades = result.trades.len(),
            "Backtest completed"
        );

        Ok(result)
    }

    // Private methods

    fn load_series(&self, backtest: &BacktestConfig) -> Result<BTreeMap<String, Vec<Bar>>> {
        let mut series = BTreeMap::new();
        for symbol in &backtest.symbols {
            let bars = self
                .data_source
                .get_bars(symbol, backtest.start_date, backtest.end_date)?;
            if bars.is_empty() {
                return Err(Error::EmptyDataRange {
                    symbol: symbol.clone(),
                    start: backtest.start_date,
                    end: backtest.end_date,
                });
            }
            validate_series(symbol, &bars)?;
            debug!(symbol = %symbol, bars = bars.len(), "Loaded bars");
            series.insert(symbol.clone(), bars);
        }
        Ok(series)
    }

    fn process_bar(
        &self,
        strategy: &Strategy,
        symbol: &str,
        bars: &[Bar],
        idx: usize,
        state: &mut SimulationState,
    ) -> Result<()> {
        let bar = &bars[idx];
        state.last_close.insert(symbol.to_string(), bar.close);
        state.bars_processed += 1;

        // The first bar of a series only seeds the valuation.
        if idx == 0 {
            return Ok(());
        }

        if let Some(trade) = self.check_exits(strategy, symbol, bar, state)? {
            state.record(trade);
        }

        if idx % strategy.trading_params.rebalance_frequency as usize != 0 {
            return Ok(());
        }

        let Some(signal) = self.signals.next(symbol, &bars[idx - 1], bar, strategy) else {
            return Ok(());
        };
        if signal.confidence < strategy.trading_params.min_confidence {
            debug!(
                symbol,
                confidence = signal.confidence,
                min = strategy.trading_params.min_confidence,
                "Signal below confidence threshold, skipping"
            );
            return Ok(());
        }

        if let Some(trade) = self.execute_signal(strategy, signal, bar, state)? {
            state.record(trade);
        }
        Ok(())
    }

    /// Close a position whose stop-loss or take-profit level was crossed at
    /// the bar close.
    fn check_exits(
        &self,
        strategy: &Strategy,
        symbol: &str,
        bar: &Bar,
        state: &mut SimulationState,
    ) -> Result<Option<Trade>> {
        let risk = &strategy.risk_params;
        let Some(position) = state.portfolio.position(symbol).filter(|p| !p.is_flat()) else {
            return Ok(None);
        };

        let cost = position.average_cost;
        let reason = match (risk.stop_loss_fraction, risk.take_profit_fraction) {
            (Some(sl), _) if bar.close <= cost * (Decimal::ONE - sl) => ExitReason::StopLoss,
            (_, Some(tp)) if bar.close >= cost * (Decimal::ONE + tp) => ExitReason::TakeProfit,
            _ => return Ok(None),
        };

        let quantity = position.quantity;
        let quote = self.config.execution.price(
            Direction::Sell,
            bar,
            &strategy.trading_params.slippage_model,
        );
        let fees = self.config.execution.fee(quantity * quote.price);
        let fill = state.portfolio.apply_sell(symbol, quantity, quote.price, fees)?;

        debug!(symbol, ?reason, pnl = %fill.realized_pnl, "Forced exit");

        Ok(Some(Trade {
            id: 0,
            symbol: symbol.to_string(),
            trade_type: TradeType::Sell,
            amount: fill.quantity,
            price: quote.price,
            timestamp: bar.timestamp,
            pnl: fill.realized_pnl,
            fees,
            slippage: quote.slippage,
            exit_reason: Some(reason),
            signal: None,
        }))
    }

    fn execute_signal(
        &self,
        strategy: &Strategy,
        signal: Signal,
        bar: &Bar,
        state: &mut SimulationState,
    ) -> Result<Option<Trade>> {
        let symbol = signal.symbol.clone();
        let total_value = state.portfolio_value();
        let max_position_value = total_value * strategy.risk_params.max_position_size_fraction;

        let available = match signal.direction {
            Direction::Buy => state.portfolio.cash(),
            Direction::Sell => state.portfolio.quantity(&symbol) * bar.close,
        };
        let position_value = max_position_value.min(available * self.config.cash_buffer);

        if position_value < self.config.min_trade_value {
            debug!(
                symbol = %symbol,
                direction = %signal.direction,
                value = %position_value,
                "Position size too small, skipping"
            );
            return Ok(None);
        }

        let quote = self.config.execution.price(
            signal.direction,
            bar,
            &strategy.trading_params.slippage_model,
        );
        let requested = position_value / quote.price;

        let (amount, fees, pnl) = match signal.direction {
            Direction::Buy => {
                let fees = self.config.execution.fee(requested * quote.price);
                state
                    .portfolio
                    .apply_buy(&symbol, requested, quote.price, fees)?;
                (requested, fees, Decimal::ZERO)
            }
            Direction::Sell => {
                let quantity = requested.min(state.portfolio.quantity(&symbol));
                let fees = self.config.execution.fee(quantity * quote.price);
                let fill = state
                    .portfolio
                    .apply_sell(&symbol, quantity, quote.price, fees)?;
                (fill.quantity, fees, fill.realized_pnl)
            }
        };

        debug!(
            symbol = %symbol,
            direction = %signal.direction,
            amount = %amount,
            price = %quote.price,
            "Executed signal"
        );

        Ok(Some(Trade {
            id: 0,
            symbol,
            trade_type: TradeType::from(signal.direction),
            amount,
            price: quote.price,
            timestamp: bar.timestamp,
            pnl,
            fees,
            slippage: quote.slippage,
            exit_reason: None,
            signal: Some(signal),
        }))
    }

    fn build_result(
        &self,
        strategy: &Strategy,
        backtest: &BacktestConfig,
        state: SimulationState,
    ) -> BacktestResult {
        let metrics = PortfolioMetrics::compute(
            &state.equity_curve,
            &state.trades,
            self.config.periods_per_year,
            self.config.risk_free_rate,
        );
        let drawdown_periods = drawdown_periods(&state.equity_curve);
        let attribution = PerformanceAttribution::from_trades(&state.trades);

        BacktestResult {
            strategy_name: strategy.name.clone(),
            start_time: backtest.start_date,
            end_time: backtest.end_date,
            state: state.state,
            bars_processed: state.bars_processed,
            trades: state.trades,
            equity_curve: state.equity_curve,
            metrics,
            drawdown_periods,
            attribution,
        }
    }
}

/// Merge per-symbol series into timestamp order. Each entry lists the
/// `(symbol, bar index)` pairs sharing that timestamp, in symbol order.
fn build_timeline(series: &BTreeMap<String, Vec<Bar>>) -> Vec<(DateTime<Utc>, Vec<(&str, usize)>)> {
    let mut timeline: BTreeMap<DateTime<Utc>, Vec<(&str, usize)>> = BTreeMap::new();

    for (symbol, bars) in series {
        for (idx, bar) in bars.iter().enumerate() {
            timeline
                .entry(bar.timestamp)
                .or_default()
                .push((symbol.as_str(), idx));
        }
    }

    timeline.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_store::InMemoryBarStore;
    use backtest_core::{RiskParams, SignalModel, SlippageModel, TradingParams};
    use chrono::{Duration, TimeZone};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Source {}

        impl MarketDataSource for Source {
            fn get_bars(&self, symbol: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Bar>>;
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn day(n: i64) -> DateTime<Utc> {
        t0() + Duration::days(n)
    }

    fn bars(closes: &[i64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Bar::flat(day(i as i64 + 1), Decimal::new(*c, 0), Decimal::new(1000, 0)))
            .collect()
    }

    fn backtest(days: i64) -> BacktestConfig {
        BacktestConfig::new(t0(), day(days), Decimal::new(10000, 0), vec!["BTC".to_string()])
    }

    fn strategy() -> Strategy {
        Strategy::new("test", SignalModel::Momentum)
            .with_risk_params(RiskParams {
                max_position_size_fraction: Decimal::new(5, 1),
                stop_loss_fraction: None,
                take_profit_fraction: None,
                max_drawdown_limit: 0.5,
            })
            .with_trading_params(TradingParams {
                min_confidence: 0.5,
                rebalance_frequency: 1,
                slippage_model: SlippageModel::Fixed(Decimal::ZERO),
            })
    }

    /// Emits `direction` on the listed bar timestamps.
    struct Scripted(Vec<(DateTime<Utc>, Direction, f64)>);

    impl SignalGenerator for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn next(&self, symbol: &str, _prev: &Bar, curr: &Bar, _strategy: &Strategy) -> Option<Signal> {
            self.0
                .iter()
                .find(|(ts, _, _)| *ts == curr.timestamp)
                .map(|(_, direction, confidence)| {
                    Signal::new(symbol, *direction, *confidence, curr.close, curr.close, curr.timestamp)
                })
        }
    }

    fn store(closes: &[i64]) -> InMemoryBarStore {
        InMemoryBarStore::new().with_series("BTC", bars(closes)).unwrap()
    }

    #[test]
    fn test_equity_curve_has_one_point_per_bar_plus_initial() {
        let sim = BacktestSimulator::new(store(&[100, 101, 102, 103]), Scripted(vec![]), SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();

        assert_eq!(result.state, RunState::Completed);
        assert_eq!(result.equity_curve.len(), 5);
        assert_eq!(result.equity_curve[0], (t0(), Decimal::new(10000, 0)));
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.max_drawdown, 0.0);
    }

    #[test]
    fn test_buy_respects_position_cap_and_books_fees() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);
        let mut strat = strategy();
        strat.risk_params.max_position_size_fraction = Decimal::new(1, 1); // 10%

        let sim = BacktestSimulator::new(store(&[100, 100, 100]), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        assert_eq!(result.trades.len(), 1);
        let buy = &result.trades[0];
        assert_eq!(buy.trade_type, TradeType::Buy);
        assert!(buy.notional() <= Decimal::new(1000, 0));
        assert_eq!(buy.pnl, Decimal::ZERO);
        assert_eq!(buy.id, 1);

        // Flat price, zero slippage: only the fee is lost.
        let final_value = result.final_value();
        assert_eq!(final_value, Decimal::new(10000, 0) - buy.fees);
        assert_eq!(buy.fees, Decimal::ONE);
    }

    #[test]
    fn test_low_confidence_signal_is_ignored() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.3)]);
        let sim = BacktestSimulator::new(store(&[100, 100, 100]), signals, SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();
        assert!(result.trades.is_empty());
    }

    #[test]
    fn test_sell_without_holding_produces_no_trade() {
        let signals = Scripted(vec![(day(2), Direction::Sell, 0.9)]);
        let sim = BacktestSimulator::new(store(&[100, 100, 100]), signals, SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();

        assert!(result.trades.is_empty());
        assert_eq!(result.final_value(), Decimal::new(10000, 0));
    }

    #[test]
    fn test_round_trip_realizes_pnl() {
        let signals = Scripted(vec![
            (day(2), Direction::Buy, 0.9),
            (day(3), Direction::Sell, 0.9),
        ]);
        let sim = BacktestSimulator::new(store(&[100, 100, 120, 120]), signals, SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();

        assert_eq!(result.trades.len(), 2);
        let sell = &result.trades[1];
        assert_eq!(sell.trade_type, TradeType::Sell);
        assert_eq!(sell.id, 2);
        assert!(sell.pnl > Decimal::ZERO);
        assert!(result.is_profitable());
        // Sells are capped at 95% of the holding value.
        let held = result.trades[0].amount;
        assert!(sell.amount < held);
    }

    #[test]
    fn test_total_value_matches_cash_plus_holdings() {
        let signals = Scripted(vec![
            (day(2), Direction::Buy, 0.9),
            (day(4), Direction::Buy, 0.9),
            (day(5), Direction::Sell, 0.9),
        ]);
        let closes = [100, 105, 98, 110, 107, 111];
        let sim = BacktestSimulator::new(store(&closes), signals, SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();

        // Replay the trade list by hand and compare every equity point.
        let mut cash = Decimal::new(10000, 0);
        let mut quantity = Decimal::ZERO;
        for (i, close) in closes.iter().enumerate() {
            let ts = day(i as i64 + 1);
            for trade in result.trades.iter().filter(|t| t.timestamp == ts) {
                match trade.trade_type {
                    TradeType::Buy => {
                        cash -= trade.amount * trade.price + trade.fees;
                        quantity += trade.amount;
                    }
                    TradeType::Sell => {
                        cash += trade.amount * trade.price - trade.fees;
                        quantity -= trade.amount;
                    }
                }
            }
            let expected = cash + quantity * Decimal::new(*close, 0);
            let actual = result.equity_curve[i + 1].1;
            let diff = ((expected - actual) / expected).abs();
            assert!(diff < Decimal::new(1, 9), "bar {}: {} vs {}", i, expected, actual);
        }
    }

    #[test]
    fn test_drawdown_limit_stops_run() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);
        let mut strat = strategy();
        strat.risk_params.max_position_size_fraction = Decimal::ONE;
        strat.risk_params.max_drawdown_limit = 0.05;

        // Price falls 20% after the entry; with ~95% invested equity drops >5%.
        let closes = [100, 100, 90, 80, 80, 80, 80];
        let sim = BacktestSimulator::new(store(&closes), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        assert_eq!(result.state, RunState::StoppedByRiskLimit);
        assert!(result.stopped_early());
        assert!(result.equity_curve.len() < closes.len() + 1);
        assert!(result.equity_curve.len() > 1);
        assert!(result.trades.len() < closes.len());
    }

    #[test]
    fn test_stop_loss_forces_exit() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);
        let mut strat = strategy();
        strat.risk_params.stop_loss_fraction = Some(Decimal::new(5, 2));

        let sim = BacktestSimulator::new(store(&[100, 100, 97, 94, 94]), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        assert_eq!(result.trades.len(), 2);
        let exit = &result.trades[1];
        assert_eq!(exit.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(exit.timestamp, day(4));
        assert!(exit.signal.is_none());
        assert!(exit.pnl < Decimal::ZERO);
        assert_eq!(exit.amount, result.trades[0].amount);
        assert_eq!(result.attribution.signal_trades, 1);
    }

    #[test]
    fn test_take_profit_forces_exit() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);
        let mut strat = strategy();
        strat.risk_params.take_profit_fraction = Some(Decimal::new(10, 2));

        let sim = BacktestSimulator::new(store(&[100, 100, 105, 111]), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[1].exit_reason, Some(ExitReason::TakeProfit));
        assert!(result.trades[1].pnl > Decimal::ZERO);
    }

    #[test]
    fn test_rebalance_frequency_skips_bars() {
        let signals = Counting::default();
        let mut strat = strategy();
        strat.trading_params.rebalance_frequency = 2;

        let sim = BacktestSimulator::new(store(&[100, 101, 102, 103, 104, 105]), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        // Indices 1..=5 -> only 2 and 4 are asked for a signal.
        assert_eq!(result.state, RunState::Completed);
        assert_eq!(sim.signals.calls.load(Ordering::SeqCst), 2);
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl SignalGenerator for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn next(&self, _symbol: &str, _prev: &Bar, _curr: &Bar, _strategy: &Strategy) -> Option<Signal> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn test_empty_data_range_aborts_run() {
        let mut source = MockSource::new();
        source.expect_get_bars().returning(|symbol, start, end| {
            Err(Error::EmptyDataRange {
                symbol: symbol.to_string(),
                start,
                end,
            })
        });

        let sim = BacktestSimulator::new(source, Scripted(vec![]), SimulatorConfig::default());
        let err = sim.run(&strategy(), &backtest(10)).unwrap_err();
        assert!(err.is_empty_data());
    }

    #[test]
    fn test_invalid_config_is_rejected_before_loading_data() {
        let mut source = MockSource::new();
        source.expect_get_bars().never();

        let sim = BacktestSimulator::new(source, Scripted(vec![]), SimulatorConfig::default());
        let mut cfg = backtest(10);
        cfg.initial_capital = Decimal::new(-1, 0);

        assert!(matches!(sim.run(&strategy(), &cfg), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_runs_are_reproducible() {
        let signals = Scripted(vec![
            (day(2), Direction::Buy, 0.9),
            (day(4), Direction::Sell, 0.8),
            (day(5), Direction::Buy, 0.7),
        ]);
        let sim = BacktestSimulator::new(store(&[100, 103, 99, 104, 101, 108]), signals, SimulatorConfig::default());

        let first = sim.run(&strategy(), &backtest(10)).unwrap();
        let second = sim.run(&strategy(), &backtest(10)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_multi_symbol_timeline() {
        let eth: Vec<Bar> = (1..=3)
            .map(|i| Bar::flat(day(i), Decimal::new(50, 0), Decimal::new(1000, 0)))
            .collect();
        let source = store(&[100, 100, 100]).with_series("ETH", eth).unwrap();
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);

        let mut cfg = backtest(10);
        cfg.symbols.push("ETH".to_string());

        let sim = BacktestSimulator::new(source, signals, SimulatorConfig::default());
        let result = sim.run(&strategy(), &cfg).unwrap();

        // One buy per symbol on the shared timestamp, one equity point per timestamp.
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.equity_curve.len(), 4);
        assert_eq!(result.bars_processed, 6);
        assert_eq!(result.trades[0].symbol, "BTC");
        assert_eq!(result.trades[1].symbol, "ETH");
    }

    #[test]
    fn test_bar_on_start_date_repeats_first_timestamp() {
        let bars: Vec<Bar> = (0..3)
            .map(|i| Bar::flat(day(i), Decimal::new(100, 0), Decimal::new(1000, 0)))
            .collect();
        let source = InMemoryBarStore::new().with_series("BTC", bars).unwrap();
        let sim = BacktestSimulator::new(source, Scripted(vec![]), SimulatorConfig::default());
        let result = sim.run(&strategy(), &backtest(10)).unwrap();

        assert_eq!(result.equity_curve.len(), 4);
        assert_eq!(result.equity_curve[0].0, t0());
        assert_eq!(result.equity_curve[1].0, t0());
        assert_eq!(result.equity_curve[0].1, result.equity_curve[1].1);
        assert!(result.equity_curve[1..].windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_result_json_uses_snake_case_tags() {
        let signals = Scripted(vec![(day(2), Direction::Buy, 0.9)]);
        let mut strat = strategy();
        strat.risk_params.stop_loss_fraction = Some(Decimal::new(5, 2));

        let sim = BacktestSimulator::new(store(&[100, 100, 90, 90]), signals, SimulatorConfig::default());
        let result = sim.run(&strat, &backtest(10)).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["trades"][0]["trade_type"], "buy");
        assert_eq!(json["trades"][1]["exit_reason"], "stop_loss");
        assert!(json["trades"][1]["signal"].is_null());

        let back: BacktestResult = serde_json::from_value(json).unwrap();
        assert_eq!(back.trades, result.trades);
        assert_eq!(back.state, result.state);
    }

    #[test]
    fn test_config_rejects_fee_that_overdraws() {
        let config = SimulatorConfig {
            execution: ExecutionModel::new(Decimal::new(6, 2)),
            ..SimulatorConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(SimulatorConfig::default().validate().is_ok());
    }
}
