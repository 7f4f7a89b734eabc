//! barsim CLI: run, sweep and validate backtests from TOML configs.
//!
//! Commands:
//! - `run`: execute one backtest and write its artifacts
//! - `sweep`: run a grid of matching policies and volume limits in parallel
//! - `validate`: parse and check a config without touching market data
//!
//! Logging goes to stderr and is filtered by `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use barsim_core::engine::MatchingType;
use barsim_runner::{
    run_and_export, sweep, BacktestResult, PerformanceSummary, RunConfig, SweepGrid,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT_DIR: &str = "results";

#[derive(Parser)]
#[command(name = "barsim", about = "barsim: bar-by-bar backtest simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Artifact directory. Overrides `output_dir` from the config; defaults to ./results.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Run the config once per combination of matching policy and volume limit.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Volume limits to test, comma separated (e.g. 0.1,0.25).
        #[arg(long, value_delimiter = ',')]
        volume_limits: Vec<f64>,

        /// Matching policies to test: current-bar-close, next-bar-open.
        #[arg(long, value_delimiter = ',')]
        matching: Vec<MatchingType>,
    },
    /// Parse and validate a config file.
    Validate {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(&config, output_dir),
        Commands::Sweep {
            config,
            volume_limits,
            matching,
        } => sweep_cmd(&config, volume_limits, matching),
        Commands::Validate { config } => validate_cmd(&config),
    }
}

fn load(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("cannot use config {}", path.display()))
}

fn run_cmd(config_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let dir = output_dir
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let (result, run_dir) = run_and_export(&config, &dir)?;
    print_result(&result);
    println!();
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn sweep_cmd(
    config_path: &Path,
    volume_limits: Vec<f64>,
    matchings: Vec<MatchingType>,
) -> Result<()> {
    let config = load(config_path)?;
    let grid = SweepGrid {
        volume_limits,
        matchings,
    };
    println!("Sweeping {} variants", grid.size());

    let outcomes = sweep(&config, &grid)?;

    println!();
    println!(
        "{:<40} {:>10} {:>10} {:>8} {:>12}",
        "Variant", "Return", "Max DD", "Fills", "Costs"
    );
    println!("{}", "-".repeat(84));
    for outcome in &outcomes {
        let s = &outcome.result.summary;
        println!(
            "{:<40} {:>9.2}% {:>9.2}% {:>8} {:>12.2}",
            outcome.label,
            s.total_return * 100.0,
            s.max_drawdown * 100.0,
            s.fill_count,
            s.total_commission + s.total_tax,
        );
    }
    Ok(())
}

fn validate_cmd(config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    println!("Config OK: {}", config_path.display());
    println!("  Run id:    {}", config.run_id());
    println!("  Strategy:  {}", config.strategy.name());
    println!("  Matching:  {}", config.simulation.matching.name());
    println!("  Bars:      {}", config.data.bars.display());
    Ok(())
}

fn print_result(result: &BacktestResult) {
    let s: &PerformanceSummary = &result.summary;
    println!("Run:          {}", &result.run_id[..result.run_id.len().min(12)]);
    println!("Strategy:     {}", result.strategy);
    println!("Fingerprint:  {}", result.result.fingerprint.short());
    if result.result.stopped {
        println!("Stopped early");
    }
    println!();
    println!("Bars:         {}", s.bar_count);
    println!("Orders:       {} ({} rejected)", s.order_count, s.rejected_orders);
    println!("Fills:        {}", s.fill_count);
    println!("Final value:  {:.2}", s.final_value);
    println!("Return:       {:.2}%", s.total_return * 100.0);
    if let (Some(bench), Some(excess)) = (s.benchmark_return, s.excess_return) {
        println!("Benchmark:    {:.2}%", bench * 100.0);
        println!("Excess:       {:.2}%", excess * 100.0);
    }
    println!("Max drawdown: {:.2}%", s.max_drawdown * 100.0);
    println!("Commission:   {:.2}", s.total_commission);
    println!("Tax:          {:.2}", s.total_tax);
}
