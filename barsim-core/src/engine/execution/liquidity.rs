//! Liquidity constraints: a per-bar volume cap and what happens to the rest.
//!
//! When enabled, the quantity matched on one instrument within one bar may
//! not exceed a fraction of that bar's volume. The cap is shared by every
//! order on the instrument. The unfilled remainder is carried to the next
//! bar or cancelled.

use crate::domain::Instrument;
use serde::{Deserialize, Serialize};

/// What happens to the unfilled part of an order cut by the volume cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemainderPolicy {
    /// Keep working on later bars.
    #[default]
    Carry,
    /// Cancel the remainder immediately.
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPolicy {
    /// Maximum fraction of bar volume that may be matched (0, 1].
    pub volume_limit: f64,
    #[serde(default)]
    pub remainder: RemainderPolicy,
}

impl LiquidityPolicy {
    pub fn new(volume_limit: f64, remainder: RemainderPolicy) -> Self {
        Self {
            volume_limit,
            remainder,
        }
    }

    /// Whole-lot quantity still matchable on this bar after `already_matched`.
    pub fn available(&self, instrument: &Instrument, bar_volume: f64, already_matched: f64) -> f64 {
        let raw = bar_volume * self.volume_limit - already_matched;
        if raw <= 0.0 {
            return 0.0;
        }
        instrument.round_down_to_lot(raw)
    }

    /// Split `desired` into `(matchable, remainder)`.
    pub fn constrain(
        &self,
        instrument: &Instrument,
        desired: f64,
        bar_volume: f64,
        already_matched: f64,
    ) -> (f64, f64) {
        let cap = self.available(instrument, bar_volume, already_matched);
        if desired <= cap {
            (desired, 0.0)
        } else {
            (cap, desired - cap)
        }
    }
}
