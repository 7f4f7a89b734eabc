//! In-memory data source: bars, instruments and suspensions held in ordered maps.

use super::source::{DataError, DataSource};
use crate::domain::{Bar, Instrument, InstrumentId};
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, BTreeSet};

/// A [`DataSource`] backed by ordered maps.
///
/// The calendar is the sorted union of all bar timestamps unless one is set
/// explicitly. A zero-volume bar counts as a suspension, matching how daily
/// exchange data marks halted sessions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataSource {
    instruments: BTreeMap<InstrumentId, Instrument>,
    bars: BTreeMap<InstrumentId, BTreeMap<NaiveDateTime, Bar>>,
    suspended: BTreeSet<(InstrumentId, NaiveDateTime)>,
    calendar: Option<Vec<NaiveDateTime>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.add_instrument(instrument);
        self
    }

    pub fn with_bars(mut self, bars: impl IntoIterator<Item = Bar>) -> Self {
        for bar in bars {
            self.add_bar(bar);
        }
        self
    }

    pub fn with_calendar(mut self, calendar: Vec<NaiveDateTime>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    pub fn with_suspension(mut self, id: impl Into<InstrumentId>, at: NaiveDateTime) -> Self {
        self.suspend(id.into(), at);
        self
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.id.clone(), instrument);
    }

    pub fn add_bar(&mut self, bar: Bar) {
        self.bars
            .entry(bar.instrument.clone())
            .or_default()
            .insert(bar.timestamp, bar);
    }

    pub fn suspend(&mut self, id: InstrumentId, at: NaiveDateTime) {
        self.suspended.insert((id, at));
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(BTreeMap::len).sum()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }
}

impl DataSource for InMemoryDataSource {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id)
    }

    fn trading_calendar(&self) -> Vec<NaiveDateTime> {
        if let Some(calendar) = &self.calendar {
            return calendar.clone();
        }
        let all: BTreeSet<NaiveDateTime> = self
            .bars
            .values()
            .flat_map(|series| series.keys().copied())
            .collect();
        all.into_iter().collect()
    }

    fn get_bar(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> Result<Bar, DataError> {
        if !self.instruments.contains_key(id) {
            return Err(DataError::UnknownInstrument(id.clone()));
        }
        let bar = self
            .bars
            .get(id)
            .and_then(|series| series.get(&timestamp))
            .ok_or_else(|| DataError::Unavailable {
                instrument: id.clone(),
                timestamp,
            })?;
        if bar.is_void() {
            return Err(DataError::Unavailable {
                instrument: id.clone(),
                timestamp,
            });
        }
        if !bar.is_sane() {
            return Err(DataError::InvalidBar {
                instrument: id.clone(),
                timestamp,
                reason: format!(
                    "o={} h={} l={} c={} v={}",
                    bar.open, bar.high, bar.low, bar.close, bar.volume
                ),
            });
        }
        Ok(bar.clone())
    }

    fn is_suspended(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> bool {
        if self.suspended.contains(&(id.clone(), timestamp)) {
            return true;
        }
        self.bars
            .get(id)
            .and_then(|series| series.get(&timestamp))
            .is_some_and(|bar| bar.volume <= 0.0)
    }
}
