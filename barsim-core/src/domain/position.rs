use super::ids::InstrumentId;
use super::order::Direction;
use serde::{Deserialize, Serialize};

/// Holdings in one instrument on one side of the book.
///
/// `quantity` is never negative; shorts live in their own book rather than as
/// negative longs. Mutation is crate-private and only the booking ledger calls it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    instrument: InstrumentId,
    direction: Direction,
    quantity: f64,
    avg_cost: f64,
    realized_pnl: f64,
    transaction_cost: f64,
    last_price: f64,
}

impl Position {
    pub(crate) fn new(instrument: InstrumentId, direction: Direction) -> Self {
        Self {
            instrument,
            direction,
            quantity: 0.0,
            avg_cost: 0.0,
            realized_pnl: 0.0,
            transaction_cost: 0.0,
            last_price: 0.0,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn avg_cost(&self) -> f64 {
        self.avg_cost
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn transaction_cost(&self) -> f64 {
        self.transaction_cost
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn is_flat(&self) -> bool {
        self.quantity <= 1e-10
    }

    /// `quantity * last_price`, always non-negative.
    pub fn market_value(&self) -> f64 {
        self.quantity * self.last_price
    }

    /// Contribution to account value: long adds, short subtracts.
    pub fn signed_market_value(&self) -> f64 {
        match self.direction {
            Direction::Long => self.market_value(),
            Direction::Short => -self.market_value(),
        }
    }

    /// `quantity * avg_cost`, the book value carried for this position.
    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.pnl_per_unit(self.last_price) * self.quantity
    }

    fn pnl_per_unit(&self, price: f64) -> f64 {
        match self.direction {
            Direction::Long => price - self.avg_cost,
            Direction::Short => self.avg_cost - price,
        }
    }

    /// Add exposure and re-average the cost basis.
    pub(crate) fn open(&mut self, quantity: f64, price: f64, fees: f64) {
        let total_qty = self.quantity + quantity;
        self.avg_cost = (self.quantity * self.avg_cost + quantity * price) / total_qty;
        self.quantity = total_qty;
        self.transaction_cost += fees;
        self.last_price = price;
    }

    /// Reduce exposure, returning the realized P&L. Caller checks `quantity <= self.quantity`.
    pub(crate) fn close(&mut self, quantity: f64, price: f64, fees: f64) -> f64 {
        debug_assert!(quantity <= self.quantity + 1e-9, "over-close reached Position");
        let realized = self.pnl_per_unit(price) * quantity;
        self.realized_pnl += realized;
        self.quantity -= quantity;
        if self.quantity <= 1e-10 {
            self.quantity = 0.0;
        }
        self.transaction_cost += fees;
        self.last_price = price;
        realized
    }

    pub(crate) fn mark(&mut self, price: f64) {
        self.last_price = price;
    }
}
