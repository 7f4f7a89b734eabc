use crate::domain::ids::{FillId, InstrumentId, OrderId};
use crate::domain::order::{Direction, PositionEffect, Side};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fill record.
///
/// Immutable once built: fields are private and only readable. A fill with no
/// `order_id` is a synthetic benchmark rebalance fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    id: FillId,
    order_id: Option<OrderId>,
    instrument: InstrumentId,
    side: Side,
    position_effect: PositionEffect,
    timestamp: NaiveDateTime,
    price: f64,
    quantity: f64,
    commission: f64,
    tax: f64,
}

impl Fill {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: FillId,
        order_id: Option<OrderId>,
        instrument: InstrumentId,
        side: Side,
        position_effect: PositionEffect,
        timestamp: NaiveDateTime,
        price: f64,
        quantity: f64,
        commission: f64,
        tax: f64,
    ) -> Self {
        Self {
            id,
            order_id,
            instrument,
            side,
            position_effect,
            timestamp,
            price,
            quantity,
            commission,
            tax,
        }
    }

    pub fn id(&self) -> FillId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn position_effect(&self) -> PositionEffect {
        self.position_effect
    }

    pub fn direction(&self) -> Direction {
        Direction::of(self.side, self.position_effect)
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn tax(&self) -> f64 {
        self.tax
    }

    /// `price * quantity`, before fees.
    pub fn gross_value(&self) -> f64 {
        self.price * self.quantity
    }

    /// Commission plus tax.
    pub fn fees(&self) -> f64 {
        self.commission + self.tax
    }

    /// Signed cash movement: buys pay value plus fees, sells receive value minus fees.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.gross_value() + self.fees()),
            Side::Sell => self.gross_value() - self.fees(),
        }
    }
}
