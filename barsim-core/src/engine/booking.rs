//! Booking: the cash and position ledger of one account.
//!
//! Fills are the only way in. Every check runs before the first field is
//! touched, so a refused fill leaves the ledger exactly as it was.

use crate::domain::{Direction, Fill, FillId, InstrumentId, PositionEffect, Position};
use crate::engine::positions::BookingPositions;
use crate::engine::price_board::PriceBoard;
use crate::engine::report::{LedgerSnapshot, PositionSnapshot};
use chrono::NaiveDateTime;
use thiserror::Error;

/// Ledger contract violations. Reaching one means an upstream check was
/// missed; the event loop aborts the run on any of them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    #[error(
        "insufficient {direction} position in {instrument}: closing {requested}, held {available}"
    )]
    InsufficientPosition {
        instrument: InstrumentId,
        direction: Direction,
        requested: f64,
        available: f64,
    },

    #[error("margin violation: cash would fall to {cash_after:.2}, floor is {floor:.2}")]
    MarginViolation { cash_after: f64, floor: f64 },

    #[error("invalid fill {fill_id}: {reason}")]
    InvalidFill { fill_id: FillId, reason: String },
}

/// Cash plus separate long and short books.
///
/// `total_value() == cash + long market value − short market value` at every
/// marked instant.
#[derive(Debug, Clone)]
pub struct Booking {
    long: BookingPositions,
    short: BookingPositions,
    cash: f64,
    initial_cash: f64,
    margin_floor: f64,
    realized_pnl: f64,
    total_commission: f64,
    total_tax: f64,
    fills: Vec<Fill>,
}

impl Booking {
    pub fn new(initial_cash: f64, margin_floor: f64) -> Self {
        Self {
            long: BookingPositions::new(Direction::Long),
            short: BookingPositions::new(Direction::Short),
            cash: initial_cash,
            initial_cash,
            margin_floor,
            realized_pnl: 0.0,
            total_commission: 0.0,
            total_tax: 0.0,
            fills: Vec::new(),
        }
    }

    /// Apply one fill: move cash, open or close exposure, journal the fill.
    pub fn apply_fill(&mut self, fill: Fill) -> Result<(), BookingError> {
        self.validate(&fill)?;

        let cash_after = self.cash + fill.cash_delta();
        if fill.cash_delta() < 0.0 && cash_after < self.margin_floor - 1e-9 {
            return Err(BookingError::MarginViolation {
                cash_after,
                floor: self.margin_floor,
            });
        }

        let direction = fill.direction();
        if fill.position_effect() == PositionEffect::Close {
            let available = self.book(direction).quantity(fill.instrument());
            if fill.quantity() > available + 1e-9 {
                return Err(BookingError::InsufficientPosition {
                    instrument: fill.instrument().clone(),
                    direction,
                    requested: fill.quantity(),
                    available,
                });
            }
        }

        // All checks passed; mutate.
        self.cash = cash_after;
        self.total_commission += fill.commission();
        self.total_tax += fill.tax();

        let book = self.book_mut(direction);
        match fill.position_effect() {
            PositionEffect::Open => {
                book.get_or_create(fill.instrument())
                    .open(fill.quantity(), fill.price(), fill.fees());
            }
            PositionEffect::Close => {
                let realized = book
                    .get_mut(fill.instrument())
                    .map(|pos| {
                        let qty = fill.quantity().min(pos.quantity());
                        pos.close(qty, fill.price(), fill.fees())
                    })
                    .unwrap_or(0.0);
                book.prune(fill.instrument());
                self.realized_pnl += realized;
            }
        }

        self.fills.push(fill);
        Ok(())
    }

    fn validate(&self, fill: &Fill) -> Result<(), BookingError> {
        let reason = if !(fill.quantity().is_finite() && fill.quantity() > 0.0) {
            Some(format!("quantity {}", fill.quantity()))
        } else if !(fill.price().is_finite() && fill.price() > 0.0) {
            Some(format!("price {}", fill.price()))
        } else if !(fill.commission() >= 0.0 && fill.tax() >= 0.0) {
            Some(format!("fees {} / {}", fill.commission(), fill.tax()))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(BookingError::InvalidFill {
                fill_id: fill.id(),
                reason,
            }),
            None => Ok(()),
        }
    }

    fn book(&self, direction: Direction) -> &BookingPositions {
        match direction {
            Direction::Long => &self.long,
            Direction::Short => &self.short,
        }
    }

    fn book_mut(&mut self, direction: Direction) -> &mut BookingPositions {
        match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        }
    }

    /// Update last marks from the price board. Instruments without a price
    /// keep their previous mark.
    pub(crate) fn mark_to_market(&mut self, prices: &dyn PriceBoard) {
        for pos in self.long.iter_mut().chain(self.short.iter_mut()) {
            if let Some(price) = prices.get_last_price(pos.instrument()) {
                pos.mark(price);
            }
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn margin_floor(&self) -> f64 {
        self.margin_floor
    }

    pub fn long(&self) -> &BookingPositions {
        &self.long
    }

    pub fn short(&self) -> &BookingPositions {
        &self.short
    }

    pub fn position(&self, instrument: &InstrumentId, direction: Direction) -> Option<&Position> {
        self.book(direction).get(instrument)
    }

    pub fn quantity(&self, instrument: &InstrumentId, direction: Direction) -> f64 {
        self.book(direction).quantity(instrument)
    }

    /// Long minus short market value.
    pub fn market_value(&self) -> f64 {
        self.long.market_value() - self.short.market_value()
    }

    pub fn total_value(&self) -> f64 {
        self.cash + self.market_value()
    }

    /// Cash plus positions carried at average cost. Moves only by realized
    /// P&L and fees.
    pub fn book_value(&self) -> f64 {
        self.cash + self.long.cost_basis() - self.short.cost_basis()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.long.unrealized_pnl() + self.short.unrealized_pnl()
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn total_tax(&self) -> f64 {
        self.total_tax
    }

    /// Every fill applied, in application order.
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn snapshot(&self, timestamp: NaiveDateTime) -> LedgerSnapshot {
        let positions = self
            .long
            .iter()
            .chain(self.short.iter())
            .map(PositionSnapshot::from)
            .collect();
        LedgerSnapshot {
            timestamp,
            cash: self.cash,
            market_value: self.market_value(),
            total_value: self.total_value(),
            realized_pnl: self.realized_pnl,
            unrealized_pnl: self.unrealized_pnl(),
            total_commission: self.total_commission,
            total_tax: self.total_tax,
            positions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, Side};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    fn fill(side: Side, effect: PositionEffect, qty: f64, price: f64, commission: f64) -> Fill {
        Fill::new(
            FillId(1),
            Some(OrderId(1)),
            "X".into(),
            side,
            effect,
            ts(),
            price,
            qty,
            commission,
            0.0,
        )
    }

    #[test]
    fn buy_open_debits_cash_and_creates_long() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap();

        assert_eq!(booking.cash(), 5_000.0);
        let pos = booking.position(&"X".into(), Direction::Long).unwrap();
        assert_eq!(pos.quantity(), 100.0);
        assert_eq!(pos.avg_cost(), 50.0);
        assert_eq!(booking.total_value(), 10_000.0);
    }

    #[test]
    fn sell_close_realizes_and_prunes() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap();
        booking
            .apply_fill(fill(Side::Sell, PositionEffect::Close, 100.0, 55.0, 2.0))
            .unwrap();

        assert!((booking.cash() - 10_498.0).abs() < 1e-10);
        assert!((booking.realized_pnl() - 500.0).abs() < 1e-10);
        assert!(booking.position(&"X".into(), Direction::Long).is_none());
        assert_eq!(booking.fills().len(), 2);
    }

    #[test]
    fn over_close_is_refused_without_side_effects() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap();

        let err = booking
            .apply_fill(fill(Side::Sell, PositionEffect::Close, 150.0, 50.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err,
            BookingError::InsufficientPosition { requested, available, .. }
                if requested == 150.0 && available == 100.0
        ));
        assert_eq!(booking.cash(), 5_000.0);
        assert_eq!(booking.quantity(&"X".into(), Direction::Long), 100.0);
        assert_eq!(booking.fills().len(), 1);
    }

    #[test]
    fn margin_floor_is_enforced() {
        let mut booking = Booking::new(1_000.0, 0.0);
        let err = booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, BookingError::MarginViolation { .. }));
        assert_eq!(booking.cash(), 1_000.0);
        assert!(booking.long().is_empty());
    }

    #[test]
    fn negative_floor_allows_leverage() {
        let mut booking = Booking::new(1_000.0, -5_000.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap();
        assert_eq!(booking.cash(), -4_000.0);
    }

    #[test]
    fn short_round_trip() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Sell, PositionEffect::Open, 10.0, 100.0, 0.0))
            .unwrap();
        assert_eq!(booking.cash(), 11_000.0);
        assert_eq!(booking.quantity(&"X".into(), Direction::Short), 10.0);
        assert_eq!(booking.total_value(), 10_000.0);

        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Close, 10.0, 90.0, 0.0))
            .unwrap();
        assert_eq!(booking.cash(), 10_100.0);
        assert!((booking.realized_pnl() - 100.0).abs() < 1e-10);
        assert!(booking.short().is_empty());
    }

    #[test]
    fn long_and_short_books_are_not_netted() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 10.0, 100.0, 0.0))
            .unwrap();
        booking
            .apply_fill(fill(Side::Sell, PositionEffect::Open, 4.0, 100.0, 0.0))
            .unwrap();
        assert_eq!(booking.quantity(&"X".into(), Direction::Long), 10.0);
        assert_eq!(booking.quantity(&"X".into(), Direction::Short), 4.0);
    }

    #[test]
    fn invalid_fill_is_refused() {
        let mut booking = Booking::new(10_000.0, 0.0);
        let err = booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 0.0, 50.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidFill { .. }));
    }

    #[test]
    fn mark_to_market_moves_total_value_only() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 0.0))
            .unwrap();
        let mut prices = BTreeMap::new();
        prices.insert(InstrumentId::from("X"), 60.0);
        booking.mark_to_market(&prices);

        assert_eq!(booking.total_value(), 11_000.0);
        assert_eq!(booking.book_value(), 10_000.0);
        assert!((booking.unrealized_pnl() - 1_000.0).abs() < 1e-10);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut booking = Booking::new(10_000.0, 0.0);
        booking
            .apply_fill(fill(Side::Buy, PositionEffect::Open, 100.0, 50.0, 1.0))
            .unwrap();
        let snap = booking.snapshot(ts());
        assert!((snap.cash - 4_999.0).abs() < 1e-10);
        assert_eq!(snap.positions.len(), 1);
        assert_eq!(snap.total_commission, 1.0);
    }
}
