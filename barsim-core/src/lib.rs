//! barsim core: bar-driven backtest simulation.
//!
//! - Domain types (bars, instruments, orders, fills, positions)
//! - Market data contract with an in-memory source
//! - Order book, matcher and pluggable execution policies
//! - Booking ledger for the strategy account and the benchmark
//! - Event clock that drives a `Strategy` bar by bar

pub mod data;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod strategy;

pub use engine::{run_backtest, RunControl, RunError, RunResult, SimulationConfig};
pub use strategy::Strategy;
