//! Read-only ledger snapshots pushed to reporting consumers once per bar.

use crate::domain::{Direction, InstrumentId, Position};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub instrument: InstrumentId,
    pub direction: Direction,
    pub quantity: f64,
    pub avg_cost: f64,
    pub last_price: f64,
    pub market_value: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

impl From<&Position> for PositionSnapshot {
    fn from(pos: &Position) -> Self {
        Self {
            instrument: pos.instrument().clone(),
            direction: pos.direction(),
            quantity: pos.quantity(),
            avg_cost: pos.avg_cost(),
            last_price: pos.last_price(),
            market_value: pos.market_value(),
            realized_pnl: pos.realized_pnl(),
            unrealized_pnl: pos.unrealized_pnl(),
        }
    }
}

/// Account state at one marked instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub market_value: f64,
    pub total_value: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub total_commission: f64,
    pub total_tax: f64,
    pub positions: Vec<PositionSnapshot>,
}

/// What a reporting consumer receives after each bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarReport {
    pub bar_seq: u64,
    pub account: LedgerSnapshot,
    pub benchmark: Option<LedgerSnapshot>,
}

/// Per-bar consumer. It only ever sees owned copies of ledger state.
pub trait ReportSink {
    fn on_bar(&mut self, report: &BarReport);
}

/// Discards every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn on_bar(&mut self, _report: &BarReport) {}
}

/// Keeps every report in memory.
#[derive(Debug, Default, Clone)]
pub struct SnapshotRecorder {
    reports: Vec<BarReport>,
}

impl SnapshotRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[BarReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<BarReport> {
        self.reports
    }

    /// Account total value after each bar.
    pub fn equity_curve(&self) -> Vec<f64> {
        self.reports.iter().map(|r| r.account.total_value).collect()
    }

    /// Benchmark total value after each bar, if a benchmark was configured.
    pub fn benchmark_curve(&self) -> Option<Vec<f64>> {
        self.reports
            .iter()
            .map(|r| r.benchmark.as_ref().map(|b| b.total_value))
            .collect()
    }
}

impl ReportSink for SnapshotRecorder {
    fn on_bar(&mut self, report: &BarReport) {
        self.reports.push(report.clone());
    }
}
