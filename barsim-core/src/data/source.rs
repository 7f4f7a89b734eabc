//! Data source trait and structured error types.
//!
//! The engine treats market data as a synchronous provider: everything a bar
//! needs is resolved before the bar enters processing. Storage format is the
//! implementation's concern.

use crate::domain::{Bar, Instrument, InstrumentId};
use chrono::NaiveDateTime;
use thiserror::Error;

/// Structured error types for data operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("no bar for {instrument} at {timestamp}")]
    Unavailable {
        instrument: InstrumentId,
        timestamp: NaiveDateTime,
    },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("invalid bar for {instrument} at {timestamp}: {reason}")]
    InvalidBar {
        instrument: InstrumentId,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("data error: {0}")]
    Other(String),
}

/// Historical market data contract.
///
/// Implementations must be deterministic: the same query always returns the
/// same answer within a run.
pub trait DataSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Instrument metadata, `None` if the instrument does not exist.
    fn instrument(&self, id: &InstrumentId) -> Option<&Instrument>;

    /// Every trading timestamp, in ascending order.
    fn trading_calendar(&self) -> Vec<NaiveDateTime>;

    /// The bar for `id` closing at `timestamp`.
    fn get_bar(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> Result<Bar, DataError>;

    /// Whether trading in `id` is halted at `timestamp`.
    fn is_suspended(&self, id: &InstrumentId, timestamp: NaiveDateTime) -> bool;
}
