//! Monte Carlo driver: re-runs a backtest over jittered windows to estimate
//! the distribution of outcomes.

use backtest_core::{BacktestConfig, Error, Result, Settings, Strategy};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::analytics::{mean, volatility};
use crate::data_store::MarketDataSource;
use crate::simulator::{BacktestSimulator, RunState};
use crate::strategy::SignalGenerator;

/// Percentiles reported for the return distribution.
pub const CONFIDENCE_PERCENTILES: [f64; 5] = [0.05, 0.25, 0.50, 0.75, 0.95];

const SECONDS_PER_DAY: i64 = 86_400;

/// Largest accepted start-date shift, in days.
pub const MAX_JITTER_DAYS: i64 = 3_650;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    /// Number of runs in a batch.
    pub iterations: usize,
    /// Maximum start-date shift in either direction, in days.
    pub jitter_days: i64,
    /// Seed for the window offsets.
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            iterations: 1000,
            jitter_days: 7,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            iterations: settings.monte_carlo.iterations,
            jitter_days: settings.monte_carlo.jitter_days,
            seed: settings.monte_carlo.seed,
        }
    }

    /// `None` when `jitter_days` is outside the representable range.
    pub fn jitter(&self) -> Option<Duration> {
        Duration::try_days(self.jitter_days)
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(Error::InvalidConfig(
                "monte carlo iterations must be at least 1".to_string(),
            ));
        }
        if !(0..=MAX_JITTER_DAYS).contains(&self.jitter_days) {
            return Err(Error::InvalidConfig(format!(
                "jitter_days must be in [0, {}], got {}",
                MAX_JITTER_DAYS, self.jitter_days
            )));
        }
        Ok(())
    }

    /// Window offsets for every iteration, in iteration order.
    fn offsets(&self) -> Result<Vec<Duration>> {
        let max = self
            .jitter_days
            .checked_mul(SECONDS_PER_DAY)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("jitter of {} days is out of range", self.jitter_days))
            })?
            .num_seconds();

        let mut rng = StdRng::seed_from_u64(self.seed);
        Ok((0..self.iterations)
            .map(|_| Duration::seconds(rng.gen_range(-max..=max)))
            .collect())
    }
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSample {
    pub iteration: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_return: f64,
    /// Percentage in [0, 100].
    pub max_drawdown: f64,
    pub state: RunState,
}

/// A run that failed; reported alongside the samples, never dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub iteration: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(with = "error_string")]
    pub error: Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Fraction in (0, 1), e.g. 0.05 for the 5th percentile.
    pub percentile: f64,
    pub value: f64,
}

/// Aggregate of a Monte Carlo batch. Statistics cover successful runs only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloReport {
    pub batch_id: Uuid,
    pub iterations: usize,
    pub successful_runs: usize,
    pub failed_runs: usize,
    /// Successful runs in iteration order.
    pub samples: Vec<RunSample>,
    pub mean_return: f64,
    /// Population standard deviation of total returns.
    pub std_dev_return: f64,
    pub worst_case: f64,
    pub best_case: f64,
    /// 5/25/50/75/95th percentiles; empty when no run succeeded.
    pub confidence_intervals: Vec<ConfidenceInterval>,
    /// Share of successful runs with a positive total return.
    pub probability_of_profit: f64,
    pub failures: Vec<RunFailure>,
}

impl MonteCarloReport {
    fn from_outcomes(batch_id: Uuid, iterations: usize, samples: Vec<RunSample>, failures: Vec<RunFailure>) -> Self {
        let returns: Vec<f64> = samples.iter().map(|s| s.total_return).collect();

        let mut sorted = returns.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let confidence_intervals = if sorted.is_empty() {
            Vec::new()
        } else {
            CONFIDENCE_PERCENTILES
                .iter()
                .map(|&p| ConfidenceInterval {
                    percentile: p,
                    value: percentile(&sorted, p),
                })
                .collect()
        };

        let probability_of_profit = if returns.is_empty() {
            0.0
        } else {
            returns.iter().filter(|r| **r > 0.0).count() as f64 / returns.len() as f64
        };

        Self {
            batch_id,
            iterations,
            successful_runs: samples.len(),
            failed_runs: failures.len(),
            mean_return: mean(&returns),
            std_dev_return: volatility(&returns),
            worst_case: sorted.first().copied().unwrap_or(0.0),
            best_case: sorted.last().copied().unwrap_or(0.0),
            confidence_intervals,
            probability_of_profit,
            samples,
            failures,
        }
    }

    /// Value at the given percentile, if the batch had any successful run.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        self.confidence_intervals
            .iter()
            .find(|ci| (ci.percentile - p).abs() < f64::EPSILON)
            .map(|ci| ci.value)
    }

    pub fn returns(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.total_return).collect()
    }
}

/// Floor-index percentile of an ascending slice: `sorted[min(floor(p * n), n - 1)]`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

/// Runs a simulator repeatedly over start-jittered windows.
pub struct MonteCarloDriver<D, G> {
    simulator: BacktestSimulator<D, G>,
    config: MonteCarloConfig,
}

impl<D: MarketDataSource, G: SignalGenerator> MonteCarloDriver<D, G> {
    pub fn new(simulator: BacktestSimulator<D, G>, config: MonteCarloConfig) -> Self {
        Self { simulator, config }
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    pub fn simulator(&self) -> &BacktestSimulator<D, G> {
        &self.simulator
    }

    /// Run the batch.
    ///
    /// Configuration errors fail the whole batch up front. Errors inside a
    /// shifted window (typically missing data) are isolated to that run and
    /// reported in [`MonteCarloReport::failures`].
    pub fn run(&self, strategy: &Strategy, backtest: &BacktestConfig) -> Result<MonteCarloReport> {
        self.config.validate()?;
        backtest.validate()?;
        strategy.validate()?;
        self.simulator.config().validate()?;

        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            strategy = %strategy.name,
            iterations = self.config.iterations,
            jitter_days = self.config.jitter_days,
            seed = self.config.seed,
            "Starting Monte Carlo batch"
        );

        let offsets = self.config.offsets()?;
        let outcomes: Vec<_> = offsets
            .par_iter()
            .enumerate()
            .map(|(iteration, offset)| match backtest.shifted(*offset) {
                Ok(window) => {
                    let outcome = self.simulator.run(strategy, &window);
                    (iteration, window, outcome)
                }
                // Report against the unshifted window.
                Err(error) => (iteration, backtest.clone(), Err(error)),
            })
            .collect();

        let mut samples = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (iteration, window, outcome) in outcomes {
            match outcome {
                Ok(result) => samples.push(RunSample {
                    iteration,
                    start: window.start_date,
                    end: window.end_date,
                    total_return: result.metrics.total_return,
                    max_drawdown: result.metrics.max_drawdown,
                    state: result.state,
                }),
                Err(error) => {
                    warn!(
                        %batch_id,
                        iteration,
                        start = %window.start_date,
                        error = %error,
                        "Monte Carlo run failed"
                    );
                    failures.push(RunFailure {
                        iteration,
                        start: window.start_date,
                        end: window.end_date,
                        error,
                    });
                }
            }
        }

        let report = MonteCarloReport::from_outcomes(batch_id, self.config.iterations, samples, failures);

        info!(
            %batch_id,
            successful = report.successful_runs,
            failed = report.failed_runs,
            mean_return = report.mean_return,
            std_dev = report.std_dev_return,
            "Monte Carlo batch completed"
        );

        Ok(report)
    }
}

/// `Error` is not itself serializable; failures are persisted as their message.
mod error_string {
    use backtest_core::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(error: &Error, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(error)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Error, D::Error> {
        let message = String::deserialize(deserializer)?;
        Ok(Error::DataSource(message))
    }
}
