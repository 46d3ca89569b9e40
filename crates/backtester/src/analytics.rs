//! Risk analytics: pure functions over equity curves, returns, and trades.
//!
//! Every function here is per-bar and period-agnostic. Annualization happens
//! only in [`PortfolioMetrics::compute`], which scales volatility and Sharpe
//! by `sqrt(periods_per_year)`.

use backtest_core::Trade;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ordered `(timestamp, total value)` points, one per simulated bar.
pub type EquityCurve = Vec<(DateTime<Utc>, Decimal)>;

/// Standard deviations at or below this are treated as zero variance.
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Per-bar simple returns `(e[i] - e[i-1]) / e[i-1]`. Steps from a
/// non-positive value yield 0.
pub fn simple_returns(equity_curve: &[(DateTime<Utc>, Decimal)]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].1;
            let curr = w[1].1;
            if prev <= Decimal::ZERO {
                0.0
            } else {
                ((curr - prev) / prev).to_f64().unwrap_or(0.0)
            }
        })
        .collect()
}

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation of `returns`; 0 for an empty slice.
pub fn volatility(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mu = mean(returns);
    let variance = returns.iter().map(|r| (r - mu).powi(2)).sum::<f64>() / returns.len() as f64;
    variance.sqrt()
}

/// `(mean(returns) - risk_free_rate) / std(returns)`; 0 when the returns
/// have no variance.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let std_dev = volatility(returns);
    if std_dev <= ZERO_VARIANCE_TOLERANCE {
        return 0.0;
    }
    (mean(returns) - risk_free_rate) / std_dev
}

/// Like [`sharpe_ratio`] but divides by downside deviation (root mean square
/// of returns below the risk-free rate). 0 when there is no downside.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let downside: Vec<f64> = returns
        .iter()
        .filter(|&&r| r < risk_free_rate)
        .map(|&r| (r - risk_free_rate).powi(2))
        .collect();
    if downside.is_empty() {
        return 0.0;
    }
    let downside_dev = (downside.iter().sum::<f64>() / returns.len() as f64).sqrt();
    if downside_dev <= ZERO_VARIANCE_TOLERANCE {
        return 0.0;
    }
    (mean(returns) - risk_free_rate) / downside_dev
}

/// Largest peak-to-trough decline, as a percentage in [0, 100].
pub fn max_drawdown(equity_curve: &[(DateTime<Utc>, Decimal)]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.1;
    let mut max_drawdown: f64 = 0.0;

    for (_, value) in equity_curve {
        if *value > peak {
            peak = *value;
        }
        if peak <= Decimal::ZERO {
            continue;
        }
        let drawdown = ((peak - *value) / peak).to_f64().unwrap_or(0.0);
        max_drawdown = max_drawdown.max(drawdown);
    }

    (max_drawdown * 100.0).clamp(0.0, 100.0)
}

/// Index of the `(1 - confidence)` quantile in `n` ascending samples.
fn tail_index(n: usize, confidence: f64) -> usize {
    let idx = ((1.0 - confidence) * n as f64).floor();
    (idx.max(0.0) as usize).min(n.saturating_sub(1))
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Empirical Value at Risk: the negated `(1 - confidence)` quantile of
/// returns. `confidence = 0.95` reads the 5th percentile. 0 for no returns.
pub fn value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sorted = sorted(returns);
    -sorted[tail_index(sorted.len(), confidence)]
}

/// Conditional VaR (expected shortfall): the negated mean of returns at or
/// below the VaR quantile.
pub fn conditional_value_at_risk(returns: &[f64], confidence: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let sorted = sorted(returns);
    let idx = tail_index(sorted.len(), confidence);
    -mean(&sorted[..=idx])
}

/// Gross profit over gross loss. 0 when there are no losing trades, since an
/// infinite ratio has no clean representation.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: Decimal = trades.iter().filter(|t| t.is_winner()).map(|t| t.pnl).sum();
    let gross_loss: Decimal = trades.iter().filter(|t| t.is_loser()).map(|t| t.pnl.abs()).sum();

    if gross_loss.is_zero() {
        return 0.0;
    }
    (gross_profit / gross_loss).to_f64().unwrap_or(0.0)
}

/// Share of trades with positive P&L; 0 for no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Longest runs of consecutive winning and losing trades. Trades with zero
/// P&L (entries) do not break a run.
pub fn consecutive_streaks(trades: &[Trade]) -> (usize, usize) {
    let mut max_wins = 0;
    let mut max_losses = 0;
    let mut current_wins = 0;
    let mut current_losses = 0;

    for trade in trades {
        if trade.is_winner() {
            current_wins += 1;
            current_losses = 0;
            max_wins = max_wins.max(current_wins);
        } else if trade.is_loser() {
            current_losses += 1;
            current_wins = 0;
            max_losses = max_losses.max(current_losses);
        }
    }

    (max_wins, max_losses)
}

/// One stretch of equity below its running peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPeriod {
    /// Timestamp of the peak the decline started from.
    pub start: DateTime<Utc>,
    /// Timestamp of the lowest point.
    pub trough: DateTime<Utc>,
    /// Recovery timestamp, or the last point if never recovered.
    pub end: DateTime<Utc>,
    /// Fractional loss from peak to trough.
    pub depth: f64,
    /// Bars from peak to `end`.
    pub duration: usize,
    pub recovered: bool,
}

/// Split an equity curve into drawdown periods, oldest first.
pub fn drawdown_periods(equity_curve: &[(DateTime<Utc>, Decimal)]) -> Vec<DrawdownPeriod> {
    let mut periods = Vec::new();
    let Some(first) = equity_curve.first() else {
        return periods;
    };

    let mut peak_idx = 0;
    let mut peak = first.1;
    // (trough index, trough value) while under water
    let mut open: Option<(usize, Decimal)> = None;

    for (i, (_, value)) in equity_curve.iter().enumerate().skip(1) {
        match open {
            Some((trough_idx, trough)) => {
                if *value >= peak {
                    periods.push(close_period(equity_curve, peak_idx, trough_idx, trough, i, true));
                    open = None;
                    peak_idx = i;
                    peak = *value;
                } else if *value < trough {
                    open = Some((i, *value));
                }
            }
            None => {
                if *value >= peak {
                    peak_idx = i;
                    peak = *value;
                } else {
                    open = Some((i, *value));
                }
            }
        }
    }

    if let Some((trough_idx, trough)) = open {
        let last = equity_curve.len() - 1;
        periods.push(close_period(equity_curve, peak_idx, trough_idx, trough, last, false));
    }

    periods
}

fn close_period(
    equity_curve: &[(DateTime<Utc>, Decimal)],
    peak_idx: usize,
    trough_idx: usize,
    trough: Decimal,
    end_idx: usize,
    recovered: bool,
) -> DrawdownPeriod {
    let peak = equity_curve[peak_idx].1;
    let depth = if peak > Decimal::ZERO {
        ((peak - trough) / peak).to_f64().unwrap_or(0.0)
    } else {
        0.0
    };
    DrawdownPeriod {
        start: equity_curve[peak_idx].0,
        trough: equity_curve[trough_idx].0,
        end: equity_curve[end_idx].0,
        depth,
        duration: end_idx - peak_idx,
        recovered,
    }
}

/// Performance and risk statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub initial_value: Decimal,
    pub final_value: Decimal,
    /// `final / initial - 1`.
    pub total_return: f64,
    /// Per-bar population standard deviation of returns.
    pub volatility: f64,
    pub annualized_volatility: f64,
    /// Per-bar Sharpe ratio.
    pub sharpe_ratio: f64,
    pub annualized_sharpe: f64,
    pub sortino_ratio: f64,
    /// Percentage in [0, 100].
    pub max_drawdown: f64,
    /// One-bar 95% VaR, as a fraction of equity.
    pub var_95: f64,
    pub cvar_95: f64,
    pub profit_factor: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    /// Mean P&L of winning trades.
    pub avg_win: Decimal,
    /// Mean P&L of losing trades (negative).
    pub avg_loss: Decimal,
    pub total_fees: Decimal,
    /// Quote-currency slippage cost across all fills.
    pub total_slippage: Decimal,
}

impl PortfolioMetrics {
    /// Compute metrics for an equity curve and its trade list.
    pub fn compute(
        equity_curve: &[(DateTime<Utc>, Decimal)],
        trades: &[Trade],
        periods_per_year: f64,
        risk_free_rate: f64,
    ) -> Self {
        let initial_value = equity_curve.first().map(|p| p.1).unwrap_or(Decimal::ZERO);
        let final_value = equity_curve.last().map(|p| p.1).unwrap_or(initial_value);
        let total_return = if initial_value > Decimal::ZERO {
            ((final_value - initial_value) / initial_value)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let returns = simple_returns(equity_curve);
        let volatility = volatility(&returns);
        let sharpe = sharpe_ratio(&returns, risk_free_rate);
        let annualization = periods_per_year.max(0.0).sqrt();

        let winners: Vec<&Trade> = trades.iter().filter(|t| t.is_winner()).collect();
        let losers: Vec<&Trade> = trades.iter().filter(|t| t.is_loser()).collect();
        let avg_win = average_pnl(&winners);
        let avg_loss = average_pnl(&losers);
        let (max_consecutive_wins, max_consecutive_losses) = consecutive_streaks(trades);

        Self {
            initial_value,
            final_value,
            total_return,
            volatility,
            annualized_volatility: volatility * annualization,
            sharpe_ratio: sharpe,
            annualized_sharpe: sharpe * annualization,
            sortino_ratio: sortino_ratio(&returns, risk_free_rate),
            max_drawdown: max_drawdown(equity_curve),
            var_95: value_at_risk(&returns, 0.95),
            cvar_95: conditional_value_at_risk(&returns, 0.95),
            profit_factor: profit_factor(trades),
            win_rate: win_rate(trades),
            total_trades: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            max_consecutive_wins,
            max_consecutive_losses,
            avg_win,
            avg_loss,
            total_fees: trades.iter().map(|t| t.fees).sum(),
            total_slippage: trades.iter().map(Trade::slippage_cost).sum(),
        }
    }
}

fn average_pnl(trades: &[&Trade]) -> Decimal {
    if trades.is_empty() {
        return Decimal::ZERO;
    }
    trades.iter().map(|t| t.pnl).sum::<Decimal>() / Decimal::from(trades.len())
}
