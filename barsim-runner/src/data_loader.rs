//! CSV market data.
//!
//! Three files, all with a header row:
//! - bars: `instrument,timestamp,open,high,low,close,volume`
//! - instruments: `id,symbol,asset_class,lot_size,tick_size`
//! - suspended (optional): `instrument,timestamp`
//!
//! Timestamps are `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` or a bare date,
//! which stands for the 15:00 session close.

use barsim_core::data::{DataError, DataSource, InMemoryDataSource};
use barsim_core::domain::{AssetClass, Bar, Instrument, InstrumentId};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: unreadable timestamp '{value}'")]
    Timestamp {
        path: PathBuf,
        line: u64,
        value: String,
    },

    #[error("{path}: bar for undeclared instrument {instrument}")]
    UndeclaredInstrument { path: PathBuf, instrument: String },
}

#[derive(Debug, Deserialize)]
struct BarRow {
    instrument: String,
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    id: String,
    #[serde(default)]
    symbol: Option<String>,
    asset_class: AssetClass,
    lot_size: f64,
    tick_size: f64,
}

#[derive(Debug, Deserialize)]
struct SuspensionRow {
    instrument: String,
    timestamp: String,
}

/// Daily session close used for date-only timestamps.
fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default()
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(session_close()))
}

/// A [`DataSource`] read from CSV files into memory.
///
/// Bars that fail the OHLC sanity check are kept and reported by
/// `get_bar` as invalid, so the missing-bar policy decides what happens.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    inner: InMemoryDataSource,
    name: String,
    dataset_hash: String,
}

impl CsvDataSource {
    pub fn load(
        bars: &Path,
        instruments: &Path,
        suspended: Option<&Path>,
    ) -> Result<Self, LoadError> {
        let mut hasher = blake3::Hasher::new();
        let mut inner = InMemoryDataSource::new();

        let raw = read(instruments)?;
        hasher.update(&raw);
        for (row, _) in rows::<InstrumentRow>(instruments, &raw)? {
            let symbol = row.symbol.unwrap_or_else(|| row.id.clone());
            inner.add_instrument(Instrument::new(
                row.id,
                symbol,
                row.asset_class,
                row.lot_size,
                row.tick_size,
            ));
        }

        let raw = read(bars)?;
        hasher.update(&raw);
        let mut count = 0usize;
        for (row, line) in rows::<BarRow>(bars, &raw)? {
            let id = InstrumentId::from(row.instrument.as_str());
            if inner.instrument(&id).is_none() {
                return Err(LoadError::UndeclaredInstrument {
                    path: bars.to_path_buf(),
                    instrument: row.instrument,
                });
            }
            let timestamp = timestamp(bars, line, &row.timestamp)?;
            inner.add_bar(Bar {
                instrument: id,
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
            count += 1;
        }

        if let Some(path) = suspended {
            let raw = read(path)?;
            hasher.update(&raw);
            for (row, line) in rows::<SuspensionRow>(path, &raw)? {
                let at = timestamp(path, line, &row.timestamp)?;
                inner.suspend(row.instrument.into(), at);
            }
        }

        let source = Self {
            inner,
            name: bars.display().to_string(),
            dataset_hash: hasher.finalize().to_hex().to_string(),
        };
        tracing::info!(
            bars = count,
            instruments = source.inner.instruments().count(),
            path = %bars.display(),
            "market data loaded"
        );
        Ok(source)
    }

    /// blake3 over the raw bytes of every file read.
    pub fn dataset_hash(&self) -> &str {
        &self.dataset_hash
    }

    pub fn bar_count(&self) -> usize {
        self.inner.bar_count()
    }
}

fn read(path: &Path) -> Result<Vec<u8>, LoadError> {
    std::fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Deserialize every record, paired with its 1-based line number.
fn rows<T: DeserializeOwned>(path: &Path, raw: &[u8]) -> Result<Vec<(T, u64)>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(raw);
    let headers = reader.headers().map_err(csv_err)?.clone();
    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map_or(0, |p| p.line());
        let row = record.deserialize(Some(&headers)).map_err(csv_err)?;
        out.push((row, line));
    }
    Ok(out)
}

fn timestamp(path: &Path, line: u64, value: &str) -> Result<NaiveDateTime, LoadError> {
    parse_timestamp(value).ok_or_else(|| LoadError::Timestamp {
        path: path.to_path_buf(),
        line,
        value: value.to_string(),
    })
}

impl DataSource for CsvDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn instrument(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.inner.instrument(id)
    }

    fn trading_calendar(&self) -> Vec<NaiveDateTime> {
        self.inner.trading_calendar()
    }

    fn get_bar(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> Result<Bar, DataError> {
        self.inner.get_bar(id, timestamp)
    }

    fn is_suspended(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> bool {
        self.inner.is_suspended(id, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_accept_dates_and_datetimes() {
        let close = parse_timestamp("2024-01-02").unwrap();
        assert_eq!(close.to_string(), "2024-01-02 15:00:00");
        let intraday = parse_timestamp("2024-01-02 10:30:00").unwrap();
        assert_eq!(intraday.to_string(), "2024-01-02 10:30:00");
        assert_eq!(parse_timestamp("2024-01-02T10:30:00"), Some(intraday));
        assert!(parse_timestamp("02/01/2024").is_none());
    }
}
