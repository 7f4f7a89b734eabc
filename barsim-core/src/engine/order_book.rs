//! Order book: every order of a run and its lifecycle.
//!
//! The order book is the registry for all orders, open and terminal. It
//! manages:
//! - storage and lookup, iterated in id (submission) order
//! - status changes, all routed through `OrderStatus::transition`
//! - an audit entry for every change
//! - the reservations open orders place on cash and positions
//!
//! It never prices a fill or touches the ledger; that is the matcher's job.

use crate::domain::{
    Direction, InstrumentId, InvalidTransition, Order, OrderEvent, OrderId, OrderStatus,
    PositionEffect, RejectReason, Side,
};
use crate::engine::price_board::PriceBoard;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderBookError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id}: {source}")]
    InvalidTransition {
        order_id: OrderId,
        #[source]
        source: InvalidTransition,
    },
}

/// One status change. `from` is `None` for the entry that records arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub bar_seq: u64,
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    audit_trail: Vec<OrderAuditEntry>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted order. It must still be `Pending`.
    pub fn insert(&mut self, order: Order) {
        debug_assert_eq!(order.status(), &OrderStatus::Pending);
        self.audit_trail.push(OrderAuditEntry {
            order_id: order.id,
            bar_seq: order.submitted_seq,
            from: None,
            to: OrderStatus::Pending,
            reason: "submitted".into(),
        });
        self.orders.insert(order.id, order);
    }

    /// Store an order that failed validation, already moved to `Rejected`.
    pub fn archive_rejected(
        &mut self,
        mut order: Order,
        reason: RejectReason,
    ) -> Result<(), OrderBookError> {
        let order_id = order.id;
        let label = reason.to_string();
        order
            .apply(OrderEvent::Reject(reason))
            .map_err(|source| OrderBookError::InvalidTransition { order_id, source })?;
        self.audit_trail.push(OrderAuditEntry {
            order_id,
            bar_seq: order.submitted_seq,
            from: Some(OrderStatus::Pending),
            to: order.status().clone(),
            reason: label,
        });
        self.orders.insert(order_id, order);
        Ok(())
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    /// Every order, open or terminal, in id order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_open())
    }

    /// Ids of open orders in id order. Owned so the caller can mutate the
    /// book while walking them.
    pub fn open_order_ids(&self) -> Vec<OrderId> {
        self.open_orders().map(|o| o.id).collect()
    }

    pub fn open_orders_for<'a>(
        &'a self,
        instrument: &'a InstrumentId,
    ) -> impl Iterator<Item = &'a Order> + 'a {
        self.open_orders().filter(move |o| &o.instrument == instrument)
    }

    pub fn has_open_orders(&self) -> bool {
        self.orders.values().any(Order::is_open)
    }

    pub fn open_count(&self) -> usize {
        self.open_orders().count()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Quantity still working on open closing orders against one book.
    pub fn pending_close_quantity(&self, instrument: &InstrumentId, direction: Direction) -> f64 {
        self.open_orders_for(instrument)
            .filter(|o| o.position_effect == PositionEffect::Close && o.direction() == direction)
            .map(Order::remaining_quantity)
            .sum()
    }

    /// Cash notionally reserved by open buy orders: remaining quantity at the
    /// limit price, or at the last price for market orders.
    pub fn committed_cash(&self, prices: &dyn PriceBoard) -> f64 {
        self.open_orders()
            .filter(|o| o.side == Side::Buy)
            .map(|o| {
                let price = o
                    .order_type
                    .limit_price()
                    .or_else(|| prices.get_last_price(&o.instrument))
                    .unwrap_or(0.0);
                o.remaining_quantity() * price
            })
            .sum()
    }

    /// Record a matched quantity. Returns whether the order is now filled.
    pub fn record_fill(
        &mut self,
        order_id: OrderId,
        quantity: f64,
        price: f64,
        commission: f64,
        tax: f64,
        bar_seq: u64,
    ) -> Result<bool, OrderBookError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        let from = order.status().clone();
        order
            .record_fill(quantity, price, commission, tax)
            .map_err(|source| OrderBookError::InvalidTransition { order_id, source })?;
        let to = order.status().clone();
        let complete = to == OrderStatus::Filled;
        if from != to {
            self.push_audit(order_id, bar_seq, from, to, "matched");
        }
        Ok(complete)
    }

    pub fn cancel(
        &mut self,
        order_id: OrderId,
        bar_seq: u64,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        self.transition(order_id, bar_seq, OrderEvent::Cancel(reason.to_string()), reason)
    }

    pub fn expire(&mut self, order_id: OrderId, bar_seq: u64) -> Result<(), OrderBookError> {
        self.transition(order_id, bar_seq, OrderEvent::Expire, "expired")
    }

    /// Reject an open order during matching.
    pub fn reject(
        &mut self,
        order_id: OrderId,
        bar_seq: u64,
        reason: RejectReason,
    ) -> Result<(), OrderBookError> {
        let label = reason.to_string();
        self.transition(order_id, bar_seq, OrderEvent::Reject(reason), &label)
    }

    fn transition(
        &mut self,
        order_id: OrderId,
        bar_seq: u64,
        event: OrderEvent,
        reason: &str,
    ) -> Result<(), OrderBookError> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or(OrderBookError::OrderNotFound(order_id))?;
        let from = order.status().clone();
        order
            .apply(event)
            .map_err(|source| OrderBookError::InvalidTransition { order_id, source })?;
        let to = order.status().clone();
        self.push_audit(order_id, bar_seq, from, to, reason);
        Ok(())
    }

    fn push_audit(
        &mut self,
        order_id: OrderId,
        bar_seq: u64,
        from: OrderStatus,
        to: OrderStatus,
        reason: &str,
    ) {
        self.audit_trail.push(OrderAuditEntry {
            order_id,
            bar_seq,
            from: Some(from),
            to,
            reason: reason.to_string(),
        });
    }

    pub fn audit_trail(&self) -> &[OrderAuditEntry] {
        &self.audit_trail
    }

    /// All orders in id order, consuming the book.
    pub fn into_orders(self) -> Vec<Order> {
        self.orders.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderRequest;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    fn order(id: u64, request: OrderRequest) -> Order {
        Order::new(OrderId(id), request, ts(), 1)
    }

    #[test]
    fn insert_and_lookup() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderRequest::market("X", Side::Buy, 100.0)));
        assert_eq!(book.len(), 1);
        assert!(book.get(OrderId(1)).unwrap().is_open());
        assert_eq!(book.audit_trail().len(), 1);
        assert_eq!(book.audit_trail()[0].from, None);
    }

    #[test]
    fn open_orders_iterate_in_id_order() {
        let mut book = OrderBook::new();
        book.insert(order(3, OrderRequest::market("X", Side::Buy, 100.0)));
        book.insert(order(1, OrderRequest::market("X", Side::Buy, 100.0)));
        book.insert(order(2, OrderRequest::market("Y", Side::Buy, 100.0)));
        assert_eq!(
            book.open_order_ids(),
            vec![OrderId(1), OrderId(2), OrderId(3)]
        );
        assert_eq!(book.open_orders_for(&"X".into()).count(), 2);
    }

    #[test]
    fn partial_then_full_fill() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderRequest::market("X", Side::Buy, 100.0)));

        assert!(!book.record_fill(OrderId(1), 40.0, 10.0, 0.0, 0.0, 1).unwrap());
        assert_eq!(
            book.get(OrderId(1)).unwrap().status(),
            &OrderStatus::PartiallyFilled
        );
        assert!(book.record_fill(OrderId(1), 60.0, 10.0, 0.0, 0.0, 2).unwrap());
        assert!(!book.has_open_orders());
        // submitted, partially filled, filled
        assert_eq!(book.audit_trail().len(), 3);
    }

    #[test]
    fn terminal_orders_refuse_events() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderRequest::market("X", Side::Buy, 100.0)));
        book.cancel(OrderId(1), 1, "user").unwrap();

        assert!(matches!(
            book.cancel(OrderId(1), 1, "user"),
            Err(OrderBookError::InvalidTransition { .. })
        ));
        assert!(book.expire(OrderId(1), 2).is_err());
        assert!(book.record_fill(OrderId(1), 10.0, 1.0, 0.0, 0.0, 2).is_err());
    }

    #[test]
    fn unknown_order_is_an_error() {
        let mut book = OrderBook::new();
        assert_eq!(
            book.expire(OrderId(9), 1),
            Err(OrderBookError::OrderNotFound(OrderId(9)))
        );
    }

    #[test]
    fn rejected_orders_are_archived() {
        let mut book = OrderBook::new();
        book.archive_rejected(
            order(1, OrderRequest::market("X", Side::Buy, 100.0)),
            RejectReason::PriceUnavailable,
        )
        .unwrap();
        let archived = book.get(OrderId(1)).unwrap();
        assert!(matches!(archived.status(), OrderStatus::Rejected { .. }));
        assert!(!book.has_open_orders());
    }

    #[test]
    fn pending_close_quantity_counts_only_matching_direction() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderRequest::market("X", Side::Sell, 300.0)));
        book.insert(order(
            2,
            OrderRequest::market("X", Side::Buy, 100.0).with_effect(PositionEffect::Close),
        ));
        book.insert(order(3, OrderRequest::market("Y", Side::Sell, 50.0)));

        assert_eq!(book.pending_close_quantity(&"X".into(), Direction::Long), 300.0);
        assert_eq!(book.pending_close_quantity(&"X".into(), Direction::Short), 100.0);
    }

    #[test]
    fn committed_cash_uses_limit_or_last_price() {
        let mut book = OrderBook::new();
        book.insert(order(1, OrderRequest::market("X", Side::Buy, 100.0)));
        book.insert(order(2, OrderRequest::limit("Y", Side::Buy, 10.0, 5.0)));
        book.insert(order(3, OrderRequest::market("X", Side::Sell, 100.0)));

        let mut prices = BTreeMap::new();
        prices.insert(InstrumentId::from("X"), 2.0);
        assert_eq!(book.committed_cash(&prices), 250.0);
    }
}
