//! Performance summary: pure functions over a finished run.

use barsim_core::domain::OrderStatus;
use barsim_core::engine::LedgerSnapshot;
use barsim_core::RunResult;
use serde::{Deserialize, Serialize};

/// Headline numbers for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub initial_cash: f64,
    pub final_value: f64,
    pub total_return: f64,
    /// `None` when no benchmark was configured.
    pub benchmark_return: Option<f64>,
    pub excess_return: Option<f64>,
    /// Most negative peak-to-trough move of the account, as a fraction.
    pub max_drawdown: f64,
    pub bar_count: u64,
    pub fill_count: usize,
    pub order_count: usize,
    pub rejected_orders: usize,
    pub total_commission: f64,
    pub total_tax: f64,
}

impl PerformanceSummary {
    pub fn compute(result: &RunResult) -> Self {
        let account: Vec<f64> = result.equity.iter().map(|p| p.account).collect();
        let total_return = simple_return(result.initial_cash, result.final_value());
        let benchmark_return = result
            .final_benchmark
            .as_ref()
            .map(|snapshot| simple_return(starting_value(snapshot), snapshot.total_value));
        Self {
            initial_cash: result.initial_cash,
            final_value: result.final_value(),
            total_return,
            benchmark_return,
            excess_return: benchmark_return.map(|b| total_return - b),
            max_drawdown: max_drawdown_from(result.initial_cash, &account),
            bar_count: result.bar_count,
            fill_count: result.fills.len(),
            order_count: result.orders.len(),
            rejected_orders: result
                .orders
                .iter()
                .filter(|o| matches!(o.status(), OrderStatus::Rejected { .. }))
                .count(),
            total_commission: result.final_account.total_commission,
            total_tax: result.final_account.total_tax,
        }
    }
}

/// `(end - start) / start`, or 0 for a non-positive start.
pub fn simple_return(start: f64, end: f64) -> f64 {
    if start <= 0.0 {
        return 0.0;
    }
    (end - start) / start
}

/// Maximum drawdown as a negative fraction (0 when the curve never falls).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    if equity_curve.len() < 2 {
        return 0.0;
    }
    let mut peak = equity_curve[0];
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Capital a ledger started with, recovered from its conservation identity.
pub fn starting_value(snapshot: &LedgerSnapshot) -> f64 {
    snapshot.total_value - snapshot.realized_pnl - snapshot.unrealized_pnl
        + snapshot.total_commission
        + snapshot.total_tax
}

/// Drawdown of a curve that starts from `initial` before its first point.
fn max_drawdown_from(initial: f64, curve: &[f64]) -> f64 {
    let mut full = Vec::with_capacity(curve.len() + 1);
    full.push(initial);
    full.extend_from_slice(curve);
    max_drawdown(&full)
}
