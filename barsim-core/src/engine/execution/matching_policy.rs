//! Matching policies: when an order becomes matchable and at what price.
//!
//! Two policies exist and the set is closed, so the registry is an enum that
//! builds a boxed trait object once at run start.

use crate::domain::{Bar, Order, Side};
use serde::{Deserialize, Serialize};

pub trait MatchingPolicy: Send + Sync {
    /// Whether the matching pass runs before the strategy sees the bar.
    fn matches_before_callback(&self) -> bool;

    /// Whether `order` may match on bar cycle `bar_seq`.
    fn is_eligible(&self, order: &Order, bar_seq: u64) -> bool;

    /// Reference price for market orders and for limit improvement.
    fn reference_price(&self, bar: &Bar) -> f64;

    /// Price for a market order.
    fn market_price(&self, bar: &Bar) -> f64 {
        self.reference_price(bar)
    }

    /// Price for a limit order, or `None` when the bar's range does not reach
    /// the limit.
    fn limit_price(&self, bar: &Bar, side: Side, limit: f64) -> Option<f64> {
        let reference = self.reference_price(bar);
        match side {
            Side::Buy if bar.low <= limit => Some(limit.min(reference)),
            Side::Sell if bar.high >= limit => Some(limit.max(reference)),
            _ => None,
        }
    }

    fn name(&self) -> &'static str;
}

/// Match after the strategy callback at the same bar's close.
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentBarClose;

impl MatchingPolicy for CurrentBarClose {
    fn matches_before_callback(&self) -> bool {
        false
    }

    fn is_eligible(&self, order: &Order, bar_seq: u64) -> bool {
        order.submitted_seq <= bar_seq
    }

    fn reference_price(&self, bar: &Bar) -> f64 {
        bar.close
    }

    fn name(&self) -> &'static str {
        "CURRENT_BAR_CLOSE"
    }
}

/// Match at the next bar's open, before the strategy sees that bar.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextBarOpen;

impl MatchingPolicy for NextBarOpen {
    fn matches_before_callback(&self) -> bool {
        true
    }

    fn is_eligible(&self, order: &Order, bar_seq: u64) -> bool {
        order.submitted_seq < bar_seq
    }

    fn reference_price(&self, bar: &Bar) -> f64 {
        bar.open
    }

    fn name(&self) -> &'static str {
        "NEXT_BAR_OPEN"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingType {
    #[default]
    CurrentBarClose,
    NextBarOpen,
}

impl MatchingType {
    pub fn build(self) -> Box<dyn MatchingPolicy> {
        match self {
            Self::CurrentBarClose => Box::new(CurrentBarClose),
            Self::NextBarOpen => Box::new(NextBarOpen),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::CurrentBarClose => "CURRENT_BAR_CLOSE",
            Self::NextBarOpen => "NEXT_BAR_OPEN",
        }
    }
}

impl std::str::FromStr for MatchingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "CURRENT_BAR_CLOSE" => Ok(Self::CurrentBarClose),
            "NEXT_BAR_OPEN" => Ok(Self::NextBarOpen),
            other => Err(format!("unknown matching type: {other}")),
        }
    }
}
