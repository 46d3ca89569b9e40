//! Sim Runner
//!
//! Runs backtests and Monte Carlo batches over seeded synthetic market data.

mod cli;
mod synthetic;

use anyhow::{anyhow, Result};
use backtest_core::Settings;
use backtester::{
    builtin_generator, BacktestSimulator, MonteCarloConfig, MonteCarloDriver, MonteCarloReport,
    SimulatorConfig,
};
use clap::Parser;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use cli::{Cli, Commands, MonteCarloArgs, OutputFormat, RunArgs};
use synthetic::RandomWalk;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Backtest(args) => run_backtest(&settings, &args),
        Commands::MonteCarlo(args) => run_monte_carlo(&settings, &args),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sim_runner=info,backtester=info".into());

    // Stdout carries the report, so logs always go to stderr.
    tracing_subscriber::registry()
        .with(filter)
        .with(log_layer(json, std::io::stderr))
        .init();
}

fn log_layer<S, W>(json: bool, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer);
    if json {
        Box::new(layer.json())
    } else {
        Box::new(layer)
    }
}

/// Synthetic store covering the window plus `padding_days` on either side.
fn build_simulator(
    settings: &Settings,
    args: &RunArgs,
    padding_days: i64,
) -> Result<BacktestSimulator<backtester::InMemoryBarStore, Box<dyn backtester::SignalGenerator>>> {
    let walk = RandomWalk {
        seed: args.data_seed,
        ..RandomWalk::default()
    };
    let first_bar = chrono::Duration::try_days(padding_days)
        .and_then(|padding| args.start_time().checked_sub_signed(padding))
        .ok_or_else(|| anyhow!("padding of {} days is out of range", padding_days))?;
    let count = padding_days
        .checked_mul(2)
        .and_then(|padding| padding.checked_add(args.days))
        .and_then(|span| span.checked_add(1))
        .ok_or_else(|| anyhow!("{} days plus {} padding days is out of range", args.days, padding_days))?
        .max(1) as usize;
    let store = walk.store(&args.symbols, first_bar, count)?;

    info!(
        symbols = ?args.symbols,
        bars_per_symbol = count,
        seed = args.data_seed,
        "Generated synthetic market"
    );

    let signals = builtin_generator(args.model.into())?;
    Ok(BacktestSimulator::new(
        store,
        signals,
        SimulatorConfig::from_settings(settings),
    ))
}

fn run_backtest(settings: &Settings, args: &RunArgs) -> Result<()> {
    let config = args.backtest_config()?;
    let simulator = build_simulator(settings, args, 0)?;
    let result = simulator.run(&args.strategy(), &config)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => println!("{}", result.format_table()),
    }
    Ok(())
}

fn run_monte_carlo(settings: &Settings, args: &MonteCarloArgs) -> Result<()> {
    let mut config = MonteCarloConfig::from_settings(settings);
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(jitter_days) = args.jitter_days {
        config.jitter_days = jitter_days;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    config.validate()?;
    let backtest = args.run.backtest_config()?;

    let simulator = build_simulator(settings, &args.run, config.jitter_days)?;
    let driver = MonteCarloDriver::new(simulator, config);
    let report = driver.run(&args.run.strategy(), &backtest)?;

    match args.run.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => println!("{}", format_report(&report)),
    }
    Ok(())
}

fn format_report(report: &MonteCarloReport) -> String {
    let mut out = format!(
        r#"
══════════════════════════════════════════════════════
  MONTE CARLO: {}
══════════════════════════════════════════════════════
Runs:             {} ({} ok, {} failed)
Mean Return:      {:+.2}%
Std Dev:          {:.2}%
Worst / Best:     {:+.2}% / {:+.2}%
P(profit):        {:.1}%

PERCENTILES
──────────────────────────────────────────────────────
"#,
        report.batch_id,
        report.iterations,
        report.successful_runs,
        report.failed_runs,
        report.mean_return * 100.0,
        report.std_dev_return * 100.0,
        report.worst_case * 100.0,
        report.best_case * 100.0,
        report.probability_of_profit * 100.0,
    );
    for ci in &report.confidence_intervals {
        out.push_str(&format!(
            "p{:<15} {:+.2}%\n",
            (ci.percentile * 100.0).round(),
            ci.value * 100.0
        ));
    }
    for failure in report.failures.iter().take(5) {
        out.push_str(&format!(
            "failed run {} ({}): {}\n",
            failure.iteration, failure.start, failure.error
        ));
    }
    out
}
