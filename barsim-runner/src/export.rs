//! Artifact export: CSV tapes and a JSON summary per run.
//!
//! `write_artifacts` produces, inside one directory per run:
//! - `fills.csv`: account fills followed by benchmark fills
//! - `equity.csv`: account (and benchmark) value after every bar
//! - `orders.csv`: every order with its final status
//! - `summary.json`: run identity, simulation settings and headline metrics
//!
//! `summary.json` carries a `schema_version`. Unknown versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use barsim_core::domain::{Fill, Order, OrderStatus};
use barsim_core::engine::{EquityPoint, SimulationConfig};
use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceSummary;
use crate::runner::BacktestResult;

/// Current schema version for persisted summaries.
pub const SCHEMA_VERSION: u32 = 1;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Contents of `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: String,
    pub strategy: String,
    pub dataset_hash: String,
    pub fingerprint: String,
    pub stopped: bool,
    pub simulation: SimulationConfig,
    pub metrics: PerformanceSummary,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunSummary {
    pub fn from_result(result: &BacktestResult) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: result.run_id.clone(),
            strategy: result.strategy.clone(),
            dataset_hash: result.dataset_hash.clone(),
            fingerprint: result.result.fingerprint.as_str().to_string(),
            stopped: result.result.stopped,
            simulation: result.simulation.clone(),
            metrics: result.summary.clone(),
        }
    }
}

// ─── JSON ───────────────────────────────────────────────────────────

pub fn summary_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(&RunSummary::from_result(result))
        .context("failed to serialize run summary")
}

/// Parse a `summary.json`, rejecting schema versions newer than this build.
pub fn import_summary(json: &str) -> Result<RunSummary> {
    let summary: RunSummary =
        serde_json::from_str(json).context("failed to deserialize run summary")?;
    if summary.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            summary.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(summary)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Columns: ledger, fill_id, order_id, instrument, side, effect, timestamp,
/// price, quantity, commission, tax, cash_delta
pub fn fills_csv(fills: &[Fill], benchmark_fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "ledger",
        "fill_id",
        "order_id",
        "instrument",
        "side",
        "effect",
        "timestamp",
        "price",
        "quantity",
        "commission",
        "tax",
        "cash_delta",
    ])?;

    let tagged = fills
        .iter()
        .map(|f| ("account", f))
        .chain(benchmark_fills.iter().map(|f| ("benchmark", f)));
    for (ledger, f) in tagged {
        wtr.write_record([
            ledger.to_string(),
            f.id().to_string(),
            f.order_id().map(|id| id.to_string()).unwrap_or_default(),
            f.instrument().to_string(),
            f.side().to_string(),
            format!("{:?}", f.position_effect()).to_uppercase(),
            f.timestamp().format(TIMESTAMP_FORMAT).to_string(),
            format!("{:.4}", f.price()),
            format!("{}", f.quantity()),
            format!("{:.2}", f.commission()),
            format!("{:.2}", f.tax()),
            format!("{:.2}", f.cash_delta()),
        ])?;
    }

    into_string(wtr)
}

/// Columns: timestamp, bar_seq, account, benchmark
pub fn equity_csv(equity: &[EquityPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp", "bar_seq", "account", "benchmark"])?;
    for point in equity {
        wtr.write_record([
            point.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            point.bar_seq.to_string(),
            format!("{:.2}", point.account),
            point.benchmark.map(|v| format!("{v:.2}")).unwrap_or_default(),
        ])?;
    }
    into_string(wtr)
}

/// Columns: order_id, instrument, side, effect, type, limit_price, quantity,
/// filled, avg_price, submitted_at, status, reason
pub fn orders_csv(orders: &[Order]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "order_id",
        "instrument",
        "side",
        "effect",
        "type",
        "limit_price",
        "quantity",
        "filled",
        "avg_price",
        "submitted_at",
        "status",
        "reason",
    ])?;

    for order in orders {
        let (kind, limit) = match order.order_type.limit_price() {
            Some(p) => ("LIMIT", format!("{p:.4}")),
            None => ("MARKET", String::new()),
        };
        let reason = match order.status() {
            OrderStatus::Rejected { reason } => reason.to_string(),
            OrderStatus::Cancelled { reason } => reason.clone(),
            _ => String::new(),
        };
        wtr.write_record([
            order.id.to_string(),
            order.instrument.to_string(),
            order.side.to_string(),
            format!("{:?}", order.position_effect).to_uppercase(),
            kind.to_string(),
            limit,
            format!("{}", order.quantity),
            format!("{}", order.filled_quantity()),
            format!("{:.4}", order.avg_fill_price()),
            order.submitted_at.format(TIMESTAMP_FORMAT).to_string(),
            order.status().label().to_string(),
            reason,
        ])?;
    }

    into_string(wtr)
}

fn into_string(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

// ─── Files ──────────────────────────────────────────────────────────

/// Write all artifacts into `dir/<first 12 chars of run id>/` and return that path.
pub fn write_artifacts(dir: &Path, result: &BacktestResult) -> Result<PathBuf> {
    let run_dir = dir.join(&result.run_id[..result.run_id.len().min(12)]);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;

    let run = &result.result;
    let files = [
        ("fills.csv", fills_csv(&run.fills, &run.benchmark_fills)?),
        ("equity.csv", equity_csv(&run.equity)?),
        ("orders.csv", orders_csv(&run.orders)?),
        ("summary.json", summary_json(result)?),
    ];
    for (name, contents) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    tracing::info!(path = %run_dir.display(), "artifacts written");
    Ok(run_dir)
}
