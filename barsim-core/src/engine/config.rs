//! Simulation configuration: everything selected once at run start.

use crate::domain::InstrumentId;
use crate::engine::benchmark::RebalanceSchedule;
use crate::engine::execution::{CostConfig, LiquidityPolicy, MatchingType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("initial_cash must be positive, got {0}")]
    InitialCash(f64),

    #[error("volume_limit must be in (0, 1], got {0}")]
    VolumeLimit(f64),

    #[error("slippage_ratio must be in [0, 1), got {0}")]
    Slippage(f64),

    #[error("cost model: {0}")]
    Cost(String),

    #[error("order_expiry_bars must be at least 1")]
    ExpiryWindow,

    #[error("benchmark: {0}")]
    Benchmark(String),
}

/// What happens to orders submitted for a suspended instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspendedOrderPolicy {
    /// Reject at submission.
    #[default]
    Reject,
    /// Accept and keep pending until trading resumes.
    HoldPending,
}

/// What happens when a subscribed instrument has no bar at a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingBarPolicy {
    /// Leave the instrument out of this bar; its orders wait.
    #[default]
    Skip,
    /// Fail the run.
    Abort,
}

/// Terminal status given to orders still open when the run finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EndOfRunPolicy {
    #[default]
    Cancel,
    Expire,
}

/// Passive reference portfolio tracked next to the strategy account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Target weight per instrument; weights should sum to at most 1.
    pub weights: BTreeMap<InstrumentId, f64>,
    #[serde(default)]
    pub schedule: RebalanceSchedule,
    /// Defaults to the strategy account's initial cash.
    #[serde(default)]
    pub initial_cash: Option<f64>,
}

impl BenchmarkConfig {
    /// 100% in one instrument, bought once.
    pub fn single(instrument: impl Into<InstrumentId>) -> Self {
        let mut weights = BTreeMap::new();
        weights.insert(instrument.into(), 1.0);
        Self {
            weights,
            schedule: RebalanceSchedule::Once,
            initial_cash: None,
        }
    }
}

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub initial_cash: f64,
    pub matching: MatchingType,
    /// Adverse price move applied to market fills, as a fraction of price.
    pub slippage_ratio: f64,
    pub cost: CostConfig,
    pub liquidity: Option<LiquidityPolicy>,
    /// Cash may not fall below this. Negative values allow borrowing.
    pub margin_floor: f64,
    pub allow_short: bool,
    /// Open orders older than this many bar cycles expire.
    pub order_expiry_bars: Option<u64>,
    pub end_of_run: EndOfRunPolicy,
    pub suspended_orders: SuspendedOrderPolicy,
    pub missing_bar: MissingBarPolicy,
    /// Instruments whose bars are dispatched from the first bar on.
    pub universe: Vec<InstrumentId>,
    pub benchmark: Option<BenchmarkConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            matching: MatchingType::CurrentBarClose,
            slippage_ratio: 0.0,
            cost: CostConfig::default(),
            liquidity: None,
            margin_floor: 0.0,
            allow_short: false,
            order_expiry_bars: None,
            end_of_run: EndOfRunPolicy::Cancel,
            suspended_orders: SuspendedOrderPolicy::Reject,
            missing_bar: MissingBarPolicy::Skip,
            universe: Vec::new(),
            benchmark: None,
        }
    }
}

impl SimulationConfig {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            ..Self::default()
        }
    }

    /// No commission, tax, slippage or liquidity cap.
    pub fn frictionless(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            cost: CostConfig::Frictionless,
            ..Self::default()
        }
    }

    pub fn with_matching(mut self, matching: MatchingType) -> Self {
        self.matching = matching;
        self
    }

    pub fn with_universe<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        self.universe = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_benchmark(mut self, benchmark: BenchmarkConfig) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(ConfigError::InitialCash(self.initial_cash));
        }
        if !(0.0..1.0).contains(&self.slippage_ratio) {
            return Err(ConfigError::Slippage(self.slippage_ratio));
        }
        if let Some(liquidity) = &self.liquidity {
            let v = liquidity.volume_limit;
            if !(v > 0.0 && v <= 1.0) {
                return Err(ConfigError::VolumeLimit(v));
            }
        }
        self.cost.validate().map_err(ConfigError::Cost)?;
        if self.order_expiry_bars == Some(0) {
            return Err(ConfigError::ExpiryWindow);
        }
        if let Some(benchmark) = &self.benchmark {
            if benchmark.weights.is_empty() {
                return Err(ConfigError::Benchmark("no weights".into()));
            }
            if benchmark.weights.values().any(|w| !(w.is_finite() && *w >= 0.0)) {
                return Err(ConfigError::Benchmark("weights must be non-negative".into()));
            }
            let total: f64 = benchmark.weights.values().sum();
            if total > 1.0 + 1e-9 {
                return Err(ConfigError::Benchmark(format!(
                    "weights sum to {total}, more than 1"
                )));
            }
            if benchmark.schedule == RebalanceSchedule::EveryNBars(0) {
                return Err(ConfigError::Benchmark("rebalance interval must be at least 1".into()));
            }
            if let Some(cash) = benchmark.initial_cash {
                if !(cash.is_finite() && cash > 0.0) {
                    return Err(ConfigError::Benchmark(format!("initial_cash {cash}")));
                }
            }
        }
        Ok(())
    }
}
