//! Orders, order requests, and the order status state machine.
//!
//! Status changes go through [`OrderStatus::transition`], a single exhaustive
//! table over `(status, event)`. Terminal states accept no event, so an order
//! can never be refilled, revived, or cancelled twice.

use super::ids::{InstrumentId, OrderId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Whether a trade opens new exposure or closes existing exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionEffect {
    Open,
    Close,
}

/// Which book a trade touches. Long and short are never netted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Buy-open and sell-close touch the long book; sell-open and buy-close the short book.
    pub fn of(side: Side, effect: PositionEffect) -> Self {
        match (side, effect) {
            (Side::Buy, PositionEffect::Open) | (Side::Sell, PositionEffect::Close) => Self::Long,
            (Side::Sell, PositionEffect::Open) | (Side::Buy, PositionEffect::Close) => Self::Short,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Fill at the price the matching policy selects.
    Market,
    /// Fill at limit price or better, only when the bar's range crosses it.
    Limit { limit_price: f64 },
}

impl OrderType {
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            Self::Market => None,
            Self::Limit { limit_price } => Some(*limit_price),
        }
    }
}

/// Why an order was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum RejectReason {
    #[error("invalid quantity {0}")]
    InvalidQuantity(f64),

    #[error("unknown instrument")]
    UnknownInstrument,

    #[error("invalid limit price {0}")]
    InvalidLimitPrice(f64),

    #[error("quantity {quantity} is not a multiple of lot size {lot_size}")]
    InvalidLotSize { quantity: f64, lot_size: f64 },

    #[error("instrument is suspended")]
    Suspended,

    #[error("no price available")]
    PriceUnavailable,

    #[error("short selling is disabled")]
    ShortNotAllowed,

    #[error("insufficient position: requested {requested}, closable {available}")]
    InsufficientPosition { requested: f64, available: f64 },

    #[error("insufficient cash: requires {required:.2}, available {available:.2}")]
    InsufficientCash { required: f64, available: f64 },
}

/// A rejection surfaced synchronously to the submitter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("order {order_id} on {instrument} rejected: {reason}")]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    pub reason: RejectReason,
}

/// Order lifecycle states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, nothing matched yet.
    Pending,
    /// Some quantity matched, remainder still working.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    Rejected { reason: RejectReason },
    Cancelled { reason: String },
    /// Outlived the expiry window.
    Expired,
}

/// Something that happens to an order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    /// A fill was recorded; `complete` when nothing remains.
    Fill { complete: bool },
    Reject(RejectReason),
    Cancel(String),
    Expire,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid transition: {from} on {event}")]
pub struct InvalidTransition {
    pub from: String,
    pub event: String,
}

impl OrderStatus {
    /// Still working: may receive fills.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::PartiallyFilled)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// The transition table.
    pub fn transition(&self, event: OrderEvent) -> Result<OrderStatus, InvalidTransition> {
        use OrderStatus::*;
        match (self, event) {
            (Pending | PartiallyFilled, OrderEvent::Fill { complete: true }) => Ok(Filled),
            (Pending | PartiallyFilled, OrderEvent::Fill { complete: false }) => {
                Ok(PartiallyFilled)
            }
            (Pending | PartiallyFilled, OrderEvent::Reject(reason)) => Ok(Rejected { reason }),
            (Pending | PartiallyFilled, OrderEvent::Cancel(reason)) => Ok(Cancelled { reason }),
            (Pending | PartiallyFilled, OrderEvent::Expire) => Ok(Expired),
            (from @ (Filled | Rejected { .. } | Cancelled { .. } | Expired), event) => {
                Err(InvalidTransition {
                    from: from.label().to_string(),
                    event: format!("{event:?}"),
                })
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Rejected { .. } => "REJECTED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What strategy code asks for. The matcher turns it into an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: InstrumentId,
    pub side: Side,
    pub position_effect: PositionEffect,
    pub quantity: f64,
    pub order_type: OrderType,
}

impl OrderRequest {
    /// Market order. Buys open long exposure, sells close it.
    pub fn market(instrument: impl Into<InstrumentId>, side: Side, quantity: f64) -> Self {
        let position_effect = match side {
            Side::Buy => PositionEffect::Open,
            Side::Sell => PositionEffect::Close,
        };
        Self {
            instrument: instrument.into(),
            side,
            position_effect,
            quantity,
            order_type: OrderType::Market,
        }
    }

    pub fn limit(
        instrument: impl Into<InstrumentId>,
        side: Side,
        quantity: f64,
        limit_price: f64,
    ) -> Self {
        Self {
            order_type: OrderType::Limit { limit_price },
            ..Self::market(instrument, side, quantity)
        }
    }

    /// Override the position effect (e.g. sell-open for a short).
    pub fn with_effect(mut self, effect: PositionEffect) -> Self {
        self.position_effect = effect;
        self
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.side, self.position_effect)
    }
}

/// A single order in the order book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub position_effect: PositionEffect,
    pub order_type: OrderType,
    pub quantity: f64,
    pub submitted_at: NaiveDateTime,
    /// Bar cycle in which the order was submitted.
    pub submitted_seq: u64,
    filled_quantity: f64,
    avg_fill_price: f64,
    commission_paid: f64,
    tax_paid: f64,
    status: OrderStatus,
}

impl Order {
    pub fn new(
        id: OrderId,
        request: OrderRequest,
        submitted_at: NaiveDateTime,
        submitted_seq: u64,
    ) -> Self {
        Self {
            id,
            instrument: request.instrument,
            side: request.side,
            position_effect: request.position_effect,
            order_type: request.order_type,
            quantity: request.quantity,
            submitted_at,
            submitted_seq,
            filled_quantity: 0.0,
            avg_fill_price: 0.0,
            commission_paid: 0.0,
            tax_paid: 0.0,
            status: OrderStatus::Pending,
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.side, self.position_effect)
    }

    pub fn status(&self) -> &OrderStatus {
        &self.status
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn filled_quantity(&self) -> f64 {
        self.filled_quantity
    }

    pub fn remaining_quantity(&self) -> f64 {
        (self.quantity - self.filled_quantity).max(0.0)
    }

    /// Volume-weighted average price over all fills (0 when unfilled).
    pub fn avg_fill_price(&self) -> f64 {
        self.avg_fill_price
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    pub fn tax_paid(&self) -> f64 {
        self.tax_paid
    }

    /// Bar cycles elapsed since submission.
    pub fn age(&self, current_seq: u64) -> u64 {
        current_seq.saturating_sub(self.submitted_seq)
    }

    /// Record a matched quantity and move the status forward.
    ///
    /// Overfills are refused before any field changes.
    pub(crate) fn record_fill(
        &mut self,
        quantity: f64,
        price: f64,
        commission: f64,
        tax: f64,
    ) -> Result<(), InvalidTransition> {
        if quantity <= 0.0 || quantity > self.remaining_quantity() + 1e-9 {
            return Err(InvalidTransition {
                from: self.status.label().to_string(),
                event: format!("Fill {{ quantity: {quantity} }}"),
            });
        }
        let filled = self.filled_quantity + quantity;
        let complete = filled >= self.quantity - 1e-9;
        let next = self.status.transition(OrderEvent::Fill { complete })?;

        self.avg_fill_price =
            (self.avg_fill_price * self.filled_quantity + price * quantity) / filled;
        self.filled_quantity = if complete { self.quantity } else { filled };
        self.commission_paid += commission;
        self.tax_paid += tax;
        self.status = next;
        Ok(())
    }

    pub(crate) fn apply(&mut self, event: OrderEvent) -> Result<(), InvalidTransition> {
        self.status = self.status.transition(event)?;
        Ok(())
    }
}
