//! TOML run configuration.
//!
//! ```toml
//! output_dir = "results"
//!
//! [simulation]
//! initial_cash = 100000.0
//! matching = "NEXT_BAR_OPEN"
//!
//! [data]
//! bars = "bars.csv"
//! instruments = "instruments.csv"
//!
//! [strategy]
//! type = "BUY_AND_HOLD"
//! instrument = "000001.XSHE"
//! ```
//!
//! Relative data paths resolve against the directory of the config file.

use barsim_core::engine::{ConfigError as SimulationConfigError, SimulationConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::strategies::StrategyConfig;

/// Unique identifier for a run configuration (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid simulation settings: {0}")]
    Simulation(#[from] SimulationConfigError),

    #[error("invalid strategy settings: {0}")]
    Strategy(String),
}

/// Where the market data lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Columns: instrument, timestamp, open, high, low, close, volume.
    pub bars: PathBuf,
    /// Columns: id, symbol, asset_class, lot_size, tick_size.
    pub instruments: PathBuf,
    /// Columns: instrument, timestamp. Optional.
    #[serde(default)]
    pub suspended: Option<PathBuf>,
}

impl DataConfig {
    fn resolve(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        join(&mut self.bars);
        join(&mut self.instruments);
        if let Some(p) = self.suspended.as_mut() {
            join(p);
        }
    }
}

/// Everything needed to reproduce one backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Where `run` writes artifacts unless overridden on the command line.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default)]
    pub simulation: SimulationConfig,

    pub data: DataConfig,

    pub strategy: StrategyConfig,
}

impl RunConfig {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::parse(&text, base).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), run_id = %config.run_id(), "config loaded");
        Ok(config)
    }

    /// Parse and validate TOML text; relative paths resolve against `base`.
    pub fn parse(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.data.resolve(base);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        self.strategy.validate().map_err(ConfigError::Strategy)
    }

    /// Deterministic hash of the configuration.
    ///
    /// Two runs with identical configs share a `RunId`.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
