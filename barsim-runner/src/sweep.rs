//! Parameter sweeps over execution settings.
//!
//! Data is loaded once and shared read-only; each variant runs in its own
//! environment on the rayon pool. Results come back in grid order.

use anyhow::{Context, Result};
use barsim_core::engine::{LiquidityPolicy, MatchingType, RunControl};
use rayon::prelude::*;

use crate::config::RunConfig;
use crate::runner::{load_data, run_with_data, BacktestResult};

/// Execution settings to sweep over.
///
/// An empty list keeps the base config's value for that axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepGrid {
    /// Volume limits (fraction of bar volume) to test
    pub volume_limits: Vec<f64>,

    /// Matching policies to test
    pub matchings: Vec<MatchingType>,
}

/// One point of the grid.
#[derive(Debug, Clone)]
pub struct SweepVariant {
    pub label: String,
    pub config: RunConfig,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub label: String,
    pub result: BacktestResult,
}

impl SweepGrid {
    /// Returns the total number of configurations in this grid.
    pub fn size(&self) -> usize {
        self.volume_limits.len().max(1) * self.matchings.len().max(1)
    }

    /// Generates all configurations in the grid, matching-major.
    pub fn generate(&self, base: &RunConfig) -> Vec<SweepVariant> {
        let matchings: Vec<Option<MatchingType>> = if self.matchings.is_empty() {
            vec![None]
        } else {
            self.matchings.iter().copied().map(Some).collect()
        };
        let limits: Vec<Option<f64>> = if self.volume_limits.is_empty() {
            vec![None]
        } else {
            self.volume_limits.iter().copied().map(Some).collect()
        };

        let mut variants = Vec::with_capacity(self.size());
        for matching in &matchings {
            for limit in &limits {
                let mut config = base.clone();
                let mut label = Vec::new();
                if let Some(matching) = matching {
                    config.simulation.matching = *matching;
                    label.push(matching.name().to_string());
                }
                if let Some(limit) = limit {
                    let remainder = base
                        .simulation
                        .liquidity
                        .map(|l| l.remainder)
                        .unwrap_or_default();
                    config.simulation.liquidity = Some(LiquidityPolicy::new(*limit, remainder));
                    label.push(format!("volume_limit={limit}"));
                }
                if label.is_empty() {
                    label.push("base".to_string());
                }
                variants.push(SweepVariant {
                    label: label.join(" "),
                    config,
                });
            }
        }
        variants
    }
}

/// Run every grid variant in parallel against data loaded once from `base`.
pub fn sweep(base: &RunConfig, grid: &SweepGrid) -> Result<Vec<SweepOutcome>> {
    let variants = grid.generate(base);
    for variant in &variants {
        variant
            .config
            .validate()
            .with_context(|| format!("invalid sweep variant '{}'", variant.label))?;
    }

    let data = load_data(base).context("failed to load sweep data")?;
    let control = RunControl::new();
    tracing::info!(variants = variants.len(), "sweep started");

    variants
        .into_par_iter()
        .map(|variant| -> Result<SweepOutcome> {
            let result = run_with_data(&variant.config, &data, &control)
                .with_context(|| format!("sweep variant '{}' failed", variant.label))?;
            Ok(SweepOutcome {
                label: variant.label,
                result: BacktestResult {
                    dataset_hash: data.dataset_hash().to_string(),
                    ..result
                },
            })
        })
        .collect()
}
