//! One side of the book: every position held in a single direction.

use crate::domain::{Direction, InstrumentId, Position};
use std::collections::BTreeMap;

/// Positions for one [`Direction`], keyed by instrument.
///
/// Owned by exactly one `Booking`. Flat positions are pruned; their realized
/// P&L has already been rolled into the booking totals by then.
#[derive(Debug, Clone)]
pub struct BookingPositions {
    direction: Direction,
    positions: BTreeMap<InstrumentId, Position>,
}

impl BookingPositions {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            positions: BTreeMap::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Held quantity, zero when there is no position.
    pub fn quantity(&self, instrument: &InstrumentId) -> f64 {
        self.positions.get(instrument).map_or(0.0, Position::quantity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.positions.keys()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Σ quantity × last price.
    pub fn market_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Σ quantity × average cost.
    pub fn cost_basis(&self) -> f64 {
        self.positions.values().map(Position::cost_basis).sum()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::unrealized_pnl).sum()
    }

    pub(crate) fn get_or_create(&mut self, instrument: &InstrumentId) -> &mut Position {
        let direction = self.direction;
        self.positions
            .entry(instrument.clone())
            .or_insert_with(|| Position::new(instrument.clone(), direction))
    }

    pub(crate) fn get_mut(&mut self, instrument: &InstrumentId) -> Option<&mut Position> {
        self.positions.get_mut(instrument)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Position> {
        self.positions.values_mut()
    }

    pub(crate) fn prune(&mut self, instrument: &InstrumentId) {
        if self.positions.get(instrument).is_some_and(Position::is_flat) {
            self.positions.remove(instrument);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_book_has_zero_quantity() {
        let book = BookingPositions::new(Direction::Long);
        assert_eq!(book.quantity(&"X".into()), 0.0);
        assert!(book.is_empty());
    }

    #[test]
    fn prune_removes_only_flat_positions() {
        let mut book = BookingPositions::new(Direction::Long);
        book.get_or_create(&"X".into()).open(10.0, 5.0, 0.0);
        book.get_or_create(&"Y".into()).open(10.0, 5.0, 0.0);
        book.get_mut(&"X".into()).unwrap().close(10.0, 6.0, 0.0);

        book.prune(&"X".into());
        book.prune(&"Y".into());

        assert!(book.get(&"X".into()).is_none());
        assert_eq!(book.quantity(&"Y".into()), 10.0);
    }

    #[test]
    fn aggregates() {
        let mut book = BookingPositions::new(Direction::Long);
        book.get_or_create(&"X".into()).open(10.0, 5.0, 0.0);
        book.get_or_create(&"Y".into()).open(2.0, 50.0, 0.0);
        book.get_mut(&"Y".into()).unwrap().mark(55.0);

        assert_eq!(book.cost_basis(), 150.0);
        assert_eq!(book.market_value(), 160.0);
        assert_eq!(book.unrealized_pnl(), 10.0);
    }
}
