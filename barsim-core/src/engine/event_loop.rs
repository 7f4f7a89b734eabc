//! Event clock: drives one run bar by bar.
//!
//! Per bar:
//! 1. Check the stop flag (between bars only)
//! 2. On a new trading date: `after_trading` for the old date, `before_trading`
//!    for the new one
//! 3. Load bars and refresh the price board
//! 4. Match before or after `handle_bar`, per the matching policy
//! 5. Rebalance the benchmark if due
//! 6. Mark both ledgers and push a `BarReport` to the sink

use crate::data::{DataError, DataSource};
use crate::domain::{Fill, InstrumentId, Order, OrderId};
use crate::engine::booking::BookingError;
use crate::engine::config::{ConfigError, SimulationConfig};
use crate::engine::environment::{Environment, PhaseError, RunPhase, StrategyContext};
use crate::engine::matcher::MatchError;
use crate::engine::order_book::{OrderAuditEntry, OrderBookError};
use crate::engine::report::{LedgerSnapshot, ReportSink};
use crate::fingerprint::RunFingerprint;
use crate::strategy::Strategy;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("trading calendar is not strictly increasing: {next} after {previous}")]
    NonMonotonicTime {
        previous: NaiveDateTime,
        next: NaiveDateTime,
    },

    #[error("market data: {0}")]
    Data(#[from] DataError),

    #[error("ledger refused fill of order {order_id} on {instrument} at {timestamp}: {source}")]
    Ledger {
        timestamp: NaiveDateTime,
        instrument: InstrumentId,
        order_id: OrderId,
        #[source]
        source: BookingError,
    },

    #[error("benchmark ledger refused fill: {0}")]
    Benchmark(#[source] BookingError),

    #[error(transparent)]
    OrderBook(#[from] OrderBookError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

impl From<MatchError> for RunError {
    fn from(err: MatchError) -> Self {
        match err {
            MatchError::Ledger {
                timestamp,
                instrument,
                order_id,
                source,
            } => Self::Ledger {
                timestamp,
                instrument,
                order_id,
                source,
            },
            MatchError::OrderBook(e) => Self::OrderBook(e),
        }
    }
}

/// Cooperative stop signal shared with whoever drives the run.
///
/// Checked between bars only: a bar in progress always completes.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stop: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Total values after one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub bar_seq: u64,
    pub account: f64,
    pub benchmark: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub fills: Vec<Fill>,
    pub benchmark_fills: Vec<Fill>,
    /// Every order of the run, including rejected ones, in id order.
    pub orders: Vec<Order>,
    pub audit_trail: Vec<OrderAuditEntry>,
    pub equity: Vec<EquityPoint>,
    pub final_account: LedgerSnapshot,
    pub final_benchmark: Option<LedgerSnapshot>,
    pub bar_count: u64,
    pub initial_cash: f64,
    /// True when the run ended early on the stop flag.
    pub stopped: bool,
    pub fingerprint: RunFingerprint,
}

impl RunResult {
    pub fn final_value(&self) -> f64 {
        self.final_account.total_value
    }
}

/// Run one backtest to completion (or until stopped).
pub fn run_backtest(
    data: &dyn DataSource,
    strategy: &mut dyn Strategy,
    config: SimulationConfig,
    sink: &mut dyn ReportSink,
    control: &RunControl,
) -> Result<RunResult, RunError> {
    config.validate()?;

    let calendar = data.trading_calendar();
    if let Some(w) = calendar.windows(2).find(|w| w[0] >= w[1]) {
        return Err(RunError::NonMonotonicTime {
            previous: w[0],
            next: w[1],
        });
    }

    let initial_cash = config.initial_cash;
    let mut env = Environment::new(data, config);
    tracing::info!(
        source = data.name(),
        strategy = strategy.name(),
        bars = calendar.len(),
        initial_cash,
        "run started"
    );

    strategy.init(&mut StrategyContext::new(&mut env));

    let mut current_date: Option<NaiveDate> = None;
    let mut equity = Vec::with_capacity(calendar.len());
    let mut stopped = false;
    let mut fills = Vec::new();

    for timestamp in calendar {
        if control.is_stopped() {
            stopped = true;
            tracing::info!(%timestamp, "stop requested, ending run");
            break;
        }

        let date = timestamp.date();
        let new_day = current_date != Some(date);
        if new_day && current_date.is_some() {
            env.advance_phase(RunPhase::AfterTrading)?;
            strategy.after_trading(&mut StrategyContext::new(&mut env));
        }

        env.begin_bar(timestamp);
        if new_day {
            env.advance_phase(RunPhase::BeforeTrading)?;
            strategy.before_trading(&mut StrategyContext::new(&mut env));
            current_date = Some(date);
        }

        env.advance_phase(RunPhase::BarProcessing)?;
        env.load_bars()?;

        let before = env.matches_before_callback();
        if before {
            fills.extend(env.match_orders()?);
        }

        let snapshot = env.take_snapshot();
        strategy.handle_bar(&mut StrategyContext::new(&mut env), &snapshot);
        env.put_snapshot(snapshot);

        if !before {
            fills.extend(env.match_orders()?);
        }

        env.rebalance_benchmark().map_err(RunError::Benchmark)?;
        env.mark_to_market();

        if let Some(report) = env.bar_report() {
            equity.push(EquityPoint {
                timestamp,
                bar_seq: report.bar_seq,
                account: report.account.total_value,
                benchmark: report.benchmark.as_ref().map(|b| b.total_value),
            });
            sink.on_bar(&report);
        }
    }

    if current_date.is_some() {
        env.advance_phase(RunPhase::AfterTrading)?;
        strategy.after_trading(&mut StrategyContext::new(&mut env));
    }
    let closed = env.close_open_orders()?;
    env.advance_phase(RunPhase::Finished)?;

    let bar_count = env.bar_seq();
    let last = env.timestamp().unwrap_or_default();
    let final_account = env.booking().snapshot(last);
    let final_benchmark = env.benchmark().map(|b| b.booking().snapshot(last));
    let (book, benchmark_fills) = env.into_parts();
    let audit_trail = book.audit_trail().to_vec();
    let orders = book.into_orders();

    let fingerprint = RunFingerprint::compute(
        &fills,
        &benchmark_fills,
        &final_account,
        final_benchmark.as_ref(),
    );

    tracing::info!(
        bars = bar_count,
        fills = fills.len(),
        orders = orders.len(),
        closed_at_end = closed,
        final_value = final_account.total_value,
        stopped,
        fingerprint = fingerprint.short(),
        "run finished"
    );

    Ok(RunResult {
        fills,
        benchmark_fills,
        orders,
        audit_trail,
        equity,
        final_account,
        final_benchmark,
        bar_count,
        initial_cash,
        stopped,
        fingerprint,
    })
}
