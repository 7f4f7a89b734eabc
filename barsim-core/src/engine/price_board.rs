//! Last-known prices at the current simulated instant.

use crate::domain::{Bar, InstrumentId};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Read-only price lookup used by matching and valuation.
pub trait PriceBoard {
    /// Close of the most recently dispatched bar for `instrument`, or `None`
    /// if no bar has been seen yet. Never a default or stale placeholder.
    fn get_last_price(&self, instrument: &InstrumentId) -> Option<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceEntry {
    price: f64,
    timestamp: NaiveDateTime,
}

/// Price board refreshed from dispatched bars by the event clock.
#[derive(Debug, Clone, Default)]
pub struct BarPriceBoard {
    prices: BTreeMap<InstrumentId, PriceEntry>,
}

impl BarPriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched bar. Void bars and bars older than the stored one
    /// are ignored.
    pub(crate) fn update(&mut self, bar: &Bar) {
        if bar.is_void() {
            return;
        }
        if let Some(prev) = self.prices.get(&bar.instrument) {
            if prev.timestamp > bar.timestamp {
                return;
            }
        }
        self.prices.insert(
            bar.instrument.clone(),
            PriceEntry {
                price: bar.close,
                timestamp: bar.timestamp,
            },
        );
    }

    /// When the stored price for `instrument` was observed.
    pub fn last_update(&self, instrument: &InstrumentId) -> Option<NaiveDateTime> {
        self.prices.get(instrument).map(|e| e.timestamp)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceBoard for BarPriceBoard {
    fn get_last_price(&self, instrument: &InstrumentId) -> Option<f64> {
        self.prices.get(instrument).map(|e| e.price)
    }
}

/// Fixed prices, for valuation outside a run and for tests.
impl PriceBoard for BTreeMap<InstrumentId, f64> {
    fn get_last_price(&self, instrument: &InstrumentId) -> Option<f64> {
        self.get(instrument).copied()
    }
}
