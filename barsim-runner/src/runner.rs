//! Backtest runner. Wires config, data, strategy, engine and metrics.
//!
//! Two entry points:
//! - `run_single()`: loads the CSV data named by the config, then runs. Used by the CLI.
//! - `run_with_data()`: takes an already-loaded data source. Used by sweeps,
//!   which load once and run many variants.

use std::path::{Path, PathBuf};

use barsim_core::data::DataSource;
use barsim_core::engine::{run_backtest, NullSink, RunControl, SimulationConfig};
use barsim_core::RunResult;
use thiserror::Error;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{CsvDataSource, LoadError};
use crate::export;
use crate::metrics::PerformanceSummary;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("backtest failed: {0}")]
    Engine(#[from] barsim_core::RunError),
    #[error("export failed: {0:#}")]
    Export(anyhow::Error),
}

/// Complete result of a single backtest run.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub run_id: RunId,
    pub strategy: String,
    pub dataset_hash: String,
    pub simulation: SimulationConfig,
    pub summary: PerformanceSummary,
    pub result: RunResult,
}

/// Run a single backtest from a `RunConfig`, loading its CSV data first.
pub fn run_single(config: &RunConfig) -> Result<BacktestResult, RunnerError> {
    let data = load_data(config)?;
    let result = run_with_data(config, &data, &RunControl::new())?;
    Ok(BacktestResult {
        dataset_hash: data.dataset_hash().to_string(),
        ..result
    })
}

/// Load the data files named by `config`.
pub fn load_data(config: &RunConfig) -> Result<CsvDataSource, LoadError> {
    CsvDataSource::load(
        &config.data.bars,
        &config.data.instruments,
        config.data.suspended.as_deref(),
    )
}

/// Run against pre-loaded data. `dataset_hash` is left empty for non-CSV sources.
pub fn run_with_data(
    config: &RunConfig,
    data: &dyn DataSource,
    control: &RunControl,
) -> Result<BacktestResult, RunnerError> {
    config.validate()?;

    let mut strategy = config.strategy.build();
    let result = run_backtest(
        data,
        &mut *strategy,
        config.simulation.clone(),
        &mut NullSink,
        control,
    )?;
    let summary = PerformanceSummary::compute(&result);

    tracing::info!(
        strategy = config.strategy.name(),
        total_return = summary.total_return,
        fills = summary.fill_count,
        fingerprint = result.fingerprint.short(),
        "backtest finished"
    );

    Ok(BacktestResult {
        run_id: config.run_id(),
        strategy: config.strategy.name().to_string(),
        dataset_hash: String::new(),
        simulation: config.simulation.clone(),
        summary,
        result,
    })
}

/// Run and write artifacts under `dir/<run id prefix>`.
pub fn run_and_export(
    config: &RunConfig,
    dir: &Path,
) -> Result<(BacktestResult, PathBuf), RunnerError> {
    let result = run_single(config)?;
    let path = export::write_artifacts(dir, &result).map_err(RunnerError::Export)?;
    Ok((result, path))
}
