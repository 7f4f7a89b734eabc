//! Environment: the explicit context of one simulation run.
//!
//! Everything a run mutates lives here, owned by value: clock, price board,
//! order book, ledger, benchmark, id generator, subscribed universe. The data
//! source is borrowed. Nothing is global, so independent runs never share
//! state.

use crate::data::{DataError, DataSource};
use crate::domain::{
    BarSnapshot, Direction, Fill, IdGen, Instrument, InstrumentId, Order, OrderId, OrderRejected,
    OrderRequest, OrderType, RejectReason, Side,
};
use crate::engine::benchmark::BenchmarkAccount;
use crate::engine::booking::{Booking, BookingError};
use crate::engine::config::{EndOfRunPolicy, MissingBarPolicy, SimulationConfig};
use crate::engine::execution::slipped_price;
use crate::engine::matcher::{MarketView, MatchError, Matcher};
use crate::engine::order_book::{OrderBook, OrderBookError};
use crate::engine::price_board::{BarPriceBoard, PriceBoard};
use crate::engine::report::BarReport;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Where the run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    Initializing,
    BeforeTrading,
    BarProcessing,
    AfterTrading,
    Finished,
}

impl RunPhase {
    /// `Initializing → BeforeTrading → BarProcessing* → AfterTrading →
    /// (BeforeTrading …)* → Finished`. An empty run may finish straight from
    /// `Initializing`.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Initializing, BeforeTrading)
                | (Initializing, Finished)
                | (BeforeTrading, BarProcessing)
                | (BarProcessing, BarProcessing)
                | (BarProcessing, AfterTrading)
                | (AfterTrading, BeforeTrading)
                | (AfterTrading, Finished)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "INITIALIZING",
            Self::BeforeTrading => "BEFORE_TRADING",
            Self::BarProcessing => "BAR_PROCESSING",
            Self::AfterTrading => "AFTER_TRADING",
            Self::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal phase change {from} -> {to}")]
pub struct PhaseError {
    pub from: RunPhase,
    pub to: RunPhase,
}

pub struct Environment<'d> {
    config: SimulationConfig,
    data: &'d dyn DataSource,
    phase: RunPhase,
    timestamp: Option<NaiveDateTime>,
    bar_seq: u64,
    prices: BarPriceBoard,
    snapshot: BarSnapshot,
    book: OrderBook,
    matcher: Matcher,
    booking: Booking,
    benchmark: Option<BenchmarkAccount>,
    benchmark_fills: Vec<Fill>,
    ids: IdGen,
    universe: BTreeSet<InstrumentId>,
}

impl<'d> Environment<'d> {
    pub fn new(data: &'d dyn DataSource, config: SimulationConfig) -> Self {
        let benchmark = config
            .benchmark
            .as_ref()
            .map(|b| BenchmarkAccount::new(b, config.initial_cash));
        Self {
            matcher: Matcher::new(&config),
            booking: Booking::new(config.initial_cash, config.margin_floor),
            universe: config.universe.iter().cloned().collect(),
            data,
            phase: RunPhase::Initializing,
            timestamp: None,
            bar_seq: 0,
            prices: BarPriceBoard::new(),
            snapshot: BarSnapshot::new(),
            book: OrderBook::new(),
            benchmark,
            benchmark_fills: Vec::new(),
            ids: IdGen::default(),
            config,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn data(&self) -> &'d dyn DataSource {
        self.data
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }

    pub fn trading_date(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }

    pub fn bar_seq(&self) -> u64 {
        self.bar_seq
    }

    pub fn prices(&self) -> &BarPriceBoard {
        &self.prices
    }

    pub fn snapshot(&self) -> &BarSnapshot {
        &self.snapshot
    }

    pub fn order_book(&self) -> &OrderBook {
        &self.book
    }

    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    pub fn benchmark(&self) -> Option<&BenchmarkAccount> {
        self.benchmark.as_ref()
    }

    pub fn benchmark_fills(&self) -> &[Fill] {
        &self.benchmark_fills
    }

    pub fn universe(&self) -> &BTreeSet<InstrumentId> {
        &self.universe
    }

    pub fn matches_before_callback(&self) -> bool {
        self.matcher.matches_before_callback()
    }

    pub(crate) fn advance_phase(&mut self, next: RunPhase) -> Result<(), PhaseError> {
        if !self.phase.can_advance_to(next) {
            return Err(PhaseError {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Bar sequence stamped on orders submitted now. Orders placed before
    /// trading opens count as submitted ahead of the day's first bar.
    fn submission_seq(&self) -> u64 {
        match self.phase {
            RunPhase::BeforeTrading => self.bar_seq.saturating_sub(1),
            _ => self.bar_seq,
        }
    }

    /// Move the clock to the next bar and clear the previous bar's data.
    pub(crate) fn begin_bar(&mut self, timestamp: NaiveDateTime) {
        self.timestamp = Some(timestamp);
        self.bar_seq += 1;
        self.snapshot.clear();
    }

    /// Fetch the current bar of every subscribed instrument and refresh the
    /// price board. Benchmark constituents are priced even when the strategy
    /// does not subscribe to them, but only subscribed bars are dispatched.
    pub(crate) fn load_bars(&mut self) -> Result<(), DataError> {
        let Some(timestamp) = self.timestamp else {
            return Ok(());
        };
        let mut ids: BTreeSet<&InstrumentId> = self.universe.iter().collect();
        if let Some(benchmark) = &self.benchmark {
            ids.extend(benchmark.weights().keys());
        }
        for id in ids {
            match self.data.get_bar(id, timestamp) {
                Ok(bar) => {
                    self.prices.update(&bar);
                    if self.universe.contains(id) {
                        self.snapshot.insert(bar);
                    }
                }
                Err(err) => match self.config.missing_bar {
                    MissingBarPolicy::Skip => {
                        tracing::warn!(instrument = %id, %timestamp, error = %err, "bar skipped");
                    }
                    MissingBarPolicy::Abort => return Err(err),
                },
            }
        }
        tracing::debug!(%timestamp, bars = self.snapshot.len(), "price board refreshed");
        Ok(())
    }

    /// Snapshot handed to the strategy; restored with `put_snapshot`.
    pub(crate) fn take_snapshot(&mut self) -> BarSnapshot {
        std::mem::take(&mut self.snapshot)
    }

    pub(crate) fn put_snapshot(&mut self, snapshot: BarSnapshot) {
        self.snapshot = snapshot;
    }

    pub(crate) fn match_orders(&mut self) -> Result<Vec<Fill>, MatchError> {
        let Some(timestamp) = self.timestamp else {
            return Ok(Vec::new());
        };
        let market = MarketView {
            data: self.data,
            prices: &self.prices,
            timestamp,
            bar_seq: self.bar_seq,
        };
        self.matcher.match_orders(
            &mut self.book,
            &mut self.ids,
            &market,
            &self.snapshot,
            &mut self.booking,
        )
    }

    pub(crate) fn rebalance_benchmark(&mut self) -> Result<(), BookingError> {
        let (Some(benchmark), Some(timestamp)) = (self.benchmark.as_mut(), self.timestamp) else {
            return Ok(());
        };
        let fills = match benchmark.rebalance(self.data, &self.prices, timestamp, self.bar_seq) {
            Ok(fills) => fills,
            Err(err) => {
                tracing::error!(error = %err, "benchmark ledger refused fill");
                return Err(err);
            }
        };
        self.benchmark_fills.extend(fills);
        Ok(())
    }

    pub(crate) fn mark_to_market(&mut self) {
        self.booking.mark_to_market(&self.prices);
        if let Some(benchmark) = self.benchmark.as_mut() {
            benchmark.mark_to_market(&self.prices);
        }
    }

    pub(crate) fn bar_report(&self) -> Option<BarReport> {
        let timestamp = self.timestamp?;
        Some(BarReport {
            bar_seq: self.bar_seq,
            account: self.booking.snapshot(timestamp),
            benchmark: self
                .benchmark
                .as_ref()
                .map(|b| b.booking().snapshot(timestamp)),
        })
    }

    /// Close out every open order when the run ends.
    pub(crate) fn close_open_orders(&mut self) -> Result<usize, OrderBookError> {
        let open = self.book.open_order_ids();
        for id in &open {
            match self.config.end_of_run {
                EndOfRunPolicy::Cancel => self.book.cancel(*id, self.bar_seq, "run finished")?,
                EndOfRunPolicy::Expire => self.book.expire(*id, self.bar_seq)?,
            }
        }
        Ok(open.len())
    }

    pub(crate) fn into_parts(self) -> (OrderBook, Vec<Fill>) {
        (self.book, self.benchmark_fills)
    }
}

/// Strategy-facing view of the environment.
///
/// Strategies read market and account state and enter orders. They cannot
/// touch cash or positions; only fills move the ledger.
pub struct StrategyContext<'a, 'd> {
    env: &'a mut Environment<'d>,
}

impl<'a, 'd> StrategyContext<'a, 'd> {
    pub(crate) fn new(env: &'a mut Environment<'d>) -> Self {
        Self { env }
    }

    pub fn now(&self) -> Option<NaiveDateTime> {
        self.env.timestamp
    }

    pub fn phase(&self) -> RunPhase {
        self.env.phase
    }

    pub fn bar_seq(&self) -> u64 {
        self.env.bar_seq
    }

    pub fn last_price(&self, instrument: &InstrumentId) -> Option<f64> {
        self.env.prices.get_last_price(instrument)
    }

    pub fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.env.data.instrument(id)
    }

    pub fn booking(&self) -> &Booking {
        &self.env.booking
    }

    pub fn benchmark(&self) -> Option<&BenchmarkAccount> {
        self.env.benchmark.as_ref()
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.env.book.get(id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.env.book.open_orders()
    }

    pub fn universe(&self) -> &BTreeSet<InstrumentId> {
        &self.env.universe
    }

    /// Replace the set of instruments whose bars are dispatched.
    pub fn update_universe<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<InstrumentId>,
    {
        self.env.universe = ids.into_iter().map(Into::into).collect();
        tracing::debug!(size = self.env.universe.len(), "universe updated");
    }

    pub fn submit_order(&mut self, request: OrderRequest) -> Result<OrderId, OrderRejected> {
        let env = &mut *self.env;
        let timestamp = env.timestamp.unwrap_or_default();
        let market = MarketView {
            data: env.data,
            prices: &env.prices,
            timestamp,
            bar_seq: env.submission_seq(),
        };
        env.matcher
            .submit(request, &mut env.book, &mut env.ids, &market, &env.booking)
    }

    pub fn cancel_order(&mut self, id: OrderId) -> Result<(), OrderBookError> {
        let env = &mut *self.env;
        env.matcher.cancel(&mut env.book, id, env.bar_seq)
    }

    /// Trade a signed number of shares on the long book: positive buys,
    /// negative sells. Quantities are rounded toward zero to whole lots, except
    /// that a sell covering the whole position sells it all.
    ///
    /// Returns `Ok(None)` when nothing is left to trade after rounding.
    pub fn order_shares(
        &mut self,
        instrument: impl Into<InstrumentId>,
        amount: f64,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let instrument = instrument.into();
        let data = self.env.data;
        let Some(meta) = data.instrument(&instrument) else {
            return self.refuse(instrument, amount, RejectReason::UnknownInstrument);
        };
        let quantity = if amount >= 0.0 {
            meta.round_down_to_lot(amount)
        } else {
            let held = self.env.booking.quantity(&instrument, Direction::Long);
            if -amount >= held - 1e-9 {
                held
            } else {
                meta.round_down_to_lot(-amount)
            }
        };
        if quantity <= 0.0 {
            tracing::debug!(instrument = %instrument, amount, "order rounds to zero, skipped");
            return Ok(None);
        }
        let side = if amount >= 0.0 { Side::Buy } else { Side::Sell };
        self.submit_order(OrderRequest::market(instrument, side, quantity))
            .map(Some)
    }

    /// Trade a cash amount at the last price: positive buys, negative sells.
    /// Buys are sized at the slipped price the matcher will check, in whole
    /// lots, so the estimated cost with fees fits the free cash.
    pub fn order_value(
        &mut self,
        instrument: impl Into<InstrumentId>,
        value: f64,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let instrument = instrument.into();
        let data = self.env.data;
        let Some(meta) = data.instrument(&instrument) else {
            return self.refuse(instrument, value, RejectReason::UnknownInstrument);
        };
        let Some(price) = self.last_price(&instrument) else {
            return self.refuse(instrument, value, RejectReason::PriceUnavailable);
        };
        if value < 0.0 {
            return self.order_shares(instrument, value / price);
        }

        let quantity = self.affordable_buy(meta, price, value);
        self.order_shares(instrument, quantity)
    }

    /// Largest whole-lot buy worth at most `value` whose estimated cost fits
    /// the free cash.
    fn affordable_buy(&self, meta: &Instrument, last_price: f64, value: f64) -> f64 {
        let lot = if meta.lot_size > 0.0 { meta.lot_size } else { 1.0 };
        let price = slipped_price(
            last_price,
            Side::Buy,
            &OrderType::Market,
            self.env.config.slippage_ratio,
            meta,
        );
        let free = self.free_cash();
        let unit = price * lot;
        if !(unit > 0.0) || free <= 0.0 {
            return 0.0;
        }
        let cost = self.env.config.cost.build();

        let mut lots = (value.min(free) / unit + 1e-9).floor();
        while lots > 0.0 {
            let quantity = lots * lot;
            let required = price * quantity + cost.estimate(meta, Side::Buy, price, quantity);
            let over = required - free;
            if over <= 1e-9 {
                return quantity;
            }
            // Drop enough lots to cover the overrun.
            lots -= (over / unit).ceil().max(1.0);
        }
        0.0
    }

    /// Trade `percent` of total account value.
    pub fn order_percent(
        &mut self,
        instrument: impl Into<InstrumentId>,
        percent: f64,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let value = self.env.booking.total_value() * percent;
        self.order_value(instrument, value)
    }

    /// Trade until the long position is worth `target` at the last price. A
    /// zero target closes the whole position.
    pub fn order_target_value(
        &mut self,
        instrument: impl Into<InstrumentId>,
        target: f64,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let instrument = instrument.into();
        let held = self.env.booking.quantity(&instrument, Direction::Long);
        if target <= 0.0 {
            return self.order_shares(instrument, -held);
        }
        let Some(price) = self.last_price(&instrument) else {
            return self.refuse(instrument, target, RejectReason::PriceUnavailable);
        };
        self.order_value(instrument, target - held * price)
    }

    pub fn order_target_percent(
        &mut self,
        instrument: impl Into<InstrumentId>,
        percent: f64,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let target = self.env.booking.total_value() * percent;
        self.order_target_value(instrument, target)
    }

    /// Cash not yet spoken for by open buy orders.
    pub fn free_cash(&self) -> f64 {
        self.env.booking.cash()
            - self.env.booking.margin_floor()
            - self.env.book.committed_cash(&self.env.prices)
    }

    /// Record a helper-level refusal as a rejected order, so it shows up in
    /// the audit trail like any other.
    fn refuse(
        &mut self,
        instrument: InstrumentId,
        amount: f64,
        reason: RejectReason,
    ) -> Result<Option<OrderId>, OrderRejected> {
        let env = &mut *self.env;
        let side = if amount >= 0.0 { Side::Buy } else { Side::Sell };
        let request = OrderRequest::market(instrument, side, amount.abs());
        let market = MarketView {
            data: env.data,
            prices: &env.prices,
            timestamp: env.timestamp.unwrap_or_default(),
            bar_seq: env.submission_seq(),
        };
        Err(env
            .matcher
            .refuse(request, reason, &mut env.book, &mut env.ids, &market))
    }
}
