//! barsim runner: run orchestration on top of `barsim-core`.
//!
//! This crate provides:
//! - TOML run configuration with content-addressed run ids
//! - A CSV-backed data source
//! - Built-in strategies (buy-and-hold, SMA crossover, no-op)
//! - Single runs and parallel sweeps over execution settings
//! - Performance summaries and CSV/JSON artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod strategies;
pub mod sweep;

pub use config::{ConfigError, DataConfig, RunConfig, RunId};
pub use data_loader::{CsvDataSource, LoadError};
pub use export::{write_artifacts, RunSummary, SCHEMA_VERSION};
pub use metrics::PerformanceSummary;
pub use runner::{run_and_export, run_single, run_with_data, BacktestResult, RunnerError};
pub use strategies::StrategyConfig;
pub use sweep::{sweep, SweepGrid, SweepOutcome, SweepVariant};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn data_source_is_send_sync() {
        assert_send::<CsvDataSource>();
        assert_sync::<CsvDataSource>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<SweepGrid>();
        assert_sync::<SweepGrid>();
    }

    #[test]
    fn built_strategies_are_send() {
        let strategy = StrategyConfig::Noop.build();
        fn takes_send<T: Send>(_: T) {}
        takes_send(strategy);
    }
}
