//! Benchmark account: a passive target-weight portfolio tracked next to the
//! strategy account.
//!
//! It owns its own ledger and never sees strategy orders. Rebalancing
//! produces synthetic, cost-free fills without an order id.

use crate::data::DataSource;
use crate::domain::{Direction, Fill, IdGen, InstrumentId, PositionEffect, Side};
use crate::engine::booking::{Booking, BookingError};
use crate::engine::config::BenchmarkConfig;
use crate::engine::price_board::PriceBoard;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceSchedule {
    /// Buy the target weights on the first priced bar, then hold.
    #[default]
    Once,
    /// Restore the target weights every `n` bar cycles.
    EveryNBars(u64),
    /// Hold cash only.
    Never,
}

#[derive(Debug, Clone)]
pub struct BenchmarkAccount {
    booking: Booking,
    weights: BTreeMap<InstrumentId, f64>,
    schedule: RebalanceSchedule,
    last_rebalance: Option<u64>,
    ids: IdGen,
}

impl BenchmarkAccount {
    pub fn new(config: &BenchmarkConfig, default_cash: f64) -> Self {
        Self {
            booking: Booking::new(config.initial_cash.unwrap_or(default_cash), 0.0),
            weights: config.weights.clone(),
            schedule: config.schedule,
            last_rebalance: None,
            ids: IdGen::default(),
        }
    }

    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    pub fn weights(&self) -> &BTreeMap<InstrumentId, f64> {
        &self.weights
    }

    pub fn schedule(&self) -> RebalanceSchedule {
        self.schedule
    }

    pub fn is_due(&self, bar_seq: u64) -> bool {
        match (self.schedule, self.last_rebalance) {
            (RebalanceSchedule::Never, _) => false,
            (RebalanceSchedule::Once, last) => last.is_none(),
            (RebalanceSchedule::EveryNBars(_), None) => true,
            (RebalanceSchedule::EveryNBars(n), Some(last)) => bar_seq.saturating_sub(last) >= n,
        }
    }

    /// Bring holdings to the target weights at current prices if due.
    ///
    /// Postponed while any weighted instrument has no price or is suspended.
    /// Sells run before buys; instruments go in id order; quantities are
    /// rounded down to whole lots.
    pub fn rebalance(
        &mut self,
        data: &dyn DataSource,
        prices: &dyn PriceBoard,
        timestamp: NaiveDateTime,
        bar_seq: u64,
    ) -> Result<Vec<Fill>, BookingError> {
        if !self.is_due(bar_seq) {
            return Ok(Vec::new());
        }

        let mut quotes = BTreeMap::new();
        for id in self.weights.keys() {
            let price = prices.get_last_price(id);
            let tradable = !data.is_suspended(id, timestamp);
            match (price, data.instrument(id)) {
                (Some(price), Some(instrument)) if tradable && price > 0.0 => {
                    quotes.insert(id.clone(), (price, instrument));
                }
                _ => return Ok(Vec::new()),
            }
        }

        self.booking.mark_to_market(prices);
        let total = self.booking.total_value();

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        for (id, weight) in &self.weights {
            let Some(&(price, instrument)) = quotes.get(id) else {
                continue;
            };
            let target = instrument.round_down_to_lot(total * weight / price);
            let held = self.booking.quantity(id, Direction::Long);
            if held > target + 1e-9 {
                // Selling down to zero may include an odd lot.
                let qty = if target <= 0.0 {
                    held
                } else {
                    instrument.round_down_to_lot(held - target)
                };
                if qty > 0.0 {
                    sells.push((id.clone(), price, qty));
                }
            } else if target > held + 1e-9 {
                let qty = instrument.round_down_to_lot(target - held);
                if qty > 0.0 {
                    buys.push((id.clone(), price, qty, instrument));
                }
            }
        }

        let mut fills = Vec::new();
        for (id, price, qty) in sells {
            let fill = self.synthetic(id, Side::Sell, PositionEffect::Close, timestamp, price, qty);
            self.booking.apply_fill(fill.clone())?;
            fills.push(fill);
        }
        for (id, price, qty, instrument) in buys {
            // Never spend more than the cash on hand.
            let affordable = instrument.round_down_to_lot(self.booking.cash() / price);
            let qty = qty.min(affordable);
            if qty <= 0.0 {
                continue;
            }
            let fill = self.synthetic(id, Side::Buy, PositionEffect::Open, timestamp, price, qty);
            self.booking.apply_fill(fill.clone())?;
            fills.push(fill);
        }

        self.last_rebalance = Some(bar_seq);
        tracing::debug!(bar_seq, fills = fills.len(), "benchmark rebalanced");
        Ok(fills)
    }

    fn synthetic(
        &mut self,
        instrument: InstrumentId,
        side: Side,
        effect: PositionEffect,
        timestamp: NaiveDateTime,
        price: f64,
        quantity: f64,
    ) -> Fill {
        Fill::new(
            self.ids.next_fill_id(),
            None,
            instrument,
            side,
            effect,
            timestamp,
            price,
            quantity,
            0.0,
            0.0,
        )
    }

    pub(crate) fn mark_to_market(&mut self, prices: &dyn PriceBoard) {
        self.booking.mark_to_market(prices);
    }
}
