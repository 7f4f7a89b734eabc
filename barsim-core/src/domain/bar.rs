//! Bar, the fundamental market data unit.

use super::ids::InstrumentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// OHLCV bar for a single instrument over one interval.
///
/// `timestamp` is the bar's close time; daily bars use the session close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument: InstrumentId,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLCV sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
            && self.volume >= 0.0
    }
}

/// All bars dispatched at one timestamp, keyed by instrument.
///
/// `BTreeMap` keeps iteration order stable across runs.
#[derive(Debug, Clone, Default)]
pub struct BarSnapshot {
    bars: BTreeMap<InstrumentId, Bar>,
}

impl BarSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bar: Bar) {
        self.bars.insert(bar.instrument.clone(), bar);
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&Bar> {
        self.bars.get(instrument)
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.bars.contains_key(instrument)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.values()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.bars.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        Bar {
            instrument: "000001.XSHE".into(),
            timestamp: NaiveDate::from_ymd_opt(2018, 8, 16)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            open: 100.0,
            high: 105.0,
            low: 98.0,
            close: 103.0,
            volume: 50_000.0,
        }
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_detects_void() {
        let mut bar = sample_bar();
        bar.open = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn bar_detects_insane_high_low() {
        let mut bar = sample_bar();
        bar.high = 97.0; // below low
        assert!(!bar.is_sane());
    }

    #[test]
    fn snapshot_iterates_in_instrument_order() {
        let mut snapshot = BarSnapshot::new();
        let mut b = sample_bar();
        b.instrument = "600000.XSHG".into();
        snapshot.insert(b);
        snapshot.insert(sample_bar());

        let ids: Vec<&str> = snapshot.iter().map(|b| b.instrument.as_str()).collect();
        assert_eq!(ids, vec!["000001.XSHE", "600000.XSHG"]);
        assert_eq!(snapshot.len(), 2);
    }
}
