//! Matcher: validates new orders and turns open orders into fills.
//!
//! The matcher carries configuration only. The order book, id generator and
//! ledger are borrowed per call from the environment that owns them, and the
//! per-bar volume counters live for one matching pass.

use crate::data::DataSource;
use crate::domain::{
    BarSnapshot, Fill, IdGen, Instrument, InstrumentId, Order, OrderId, OrderRejected,
    OrderRequest, OrderType, PositionEffect, RejectReason, Side,
};
use crate::engine::booking::{Booking, BookingError};
use crate::engine::config::{SimulationConfig, SuspendedOrderPolicy};
use crate::engine::execution::{
    slipped_price, CostModel, LiquidityPolicy, MatchingPolicy, RemainderPolicy,
};
use crate::engine::order_book::{OrderBook, OrderBookError};
use crate::engine::price_board::PriceBoard;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use thiserror::Error;

const EPS: f64 = 1e-9;

/// Fatal failures of a matching pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error("ledger refused fill of order {order_id} on {instrument} at {timestamp}: {source}")]
    Ledger {
        timestamp: NaiveDateTime,
        instrument: InstrumentId,
        order_id: OrderId,
        #[source]
        source: BookingError,
    },

    #[error(transparent)]
    OrderBook(#[from] OrderBookError),
}

/// What the matcher may read about the market at the current instant.
#[derive(Clone, Copy)]
pub struct MarketView<'a> {
    pub data: &'a dyn DataSource,
    pub prices: &'a dyn PriceBoard,
    pub timestamp: NaiveDateTime,
    pub bar_seq: u64,
}

pub struct Matcher {
    policy: Box<dyn MatchingPolicy>,
    cost: Box<dyn CostModel>,
    liquidity: Option<LiquidityPolicy>,
    slippage_ratio: f64,
    allow_short: bool,
    suspended_orders: SuspendedOrderPolicy,
    order_expiry_bars: Option<u64>,
}

impl Matcher {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            policy: config.matching.build(),
            cost: config.cost.build(),
            liquidity: config.liquidity,
            slippage_ratio: config.slippage_ratio,
            allow_short: config.allow_short,
            suspended_orders: config.suspended_orders,
            order_expiry_bars: config.order_expiry_bars,
        }
    }

    pub fn policy(&self) -> &dyn MatchingPolicy {
        self.policy.as_ref()
    }

    pub fn matches_before_callback(&self) -> bool {
        self.policy.matches_before_callback()
    }

    /// Validate and accept an order. A rejected order is still archived in
    /// the book with status `Rejected`.
    pub fn submit(
        &self,
        request: OrderRequest,
        book: &mut OrderBook,
        ids: &mut IdGen,
        market: &MarketView<'_>,
        booking: &Booking,
    ) -> Result<OrderId, OrderRejected> {
        let order = Order::new(ids.next_order_id(), request, market.timestamp, market.bar_seq);
        match self.validate(&order, book, market, booking) {
            Ok(()) => {
                let id = order.id;
                tracing::debug!(
                    order_id = %id,
                    instrument = %order.instrument,
                    side = %order.side,
                    quantity = order.quantity,
                    "order accepted"
                );
                book.insert(order);
                Ok(id)
            }
            Err(reason) => Err(Self::archive_rejection(order, reason, book)),
        }
    }

    /// Record an order refused before validation could run, e.g. by a sizing
    /// helper that found no price to size against.
    pub fn refuse(
        &self,
        request: OrderRequest,
        reason: RejectReason,
        book: &mut OrderBook,
        ids: &mut IdGen,
        market: &MarketView<'_>,
    ) -> OrderRejected {
        let order = Order::new(ids.next_order_id(), request, market.timestamp, market.bar_seq);
        Self::archive_rejection(order, reason, book)
    }

    fn archive_rejection(order: Order, reason: RejectReason, book: &mut OrderBook) -> OrderRejected {
        let rejected = OrderRejected {
            order_id: order.id,
            instrument: order.instrument.clone(),
            reason: reason.clone(),
        };
        tracing::warn!(
            order_id = %rejected.order_id,
            instrument = %rejected.instrument,
            reason = %reason,
            "order rejected"
        );
        let archived = book.archive_rejected(order, reason);
        debug_assert!(archived.is_ok(), "fresh order must archive: {archived:?}");
        rejected
    }

    fn validate(
        &self,
        order: &Order,
        book: &OrderBook,
        market: &MarketView<'_>,
        booking: &Booking,
    ) -> Result<(), RejectReason> {
        if !(order.quantity.is_finite() && order.quantity > 0.0) {
            return Err(RejectReason::InvalidQuantity(order.quantity));
        }
        let instrument = market
            .data
            .instrument(&order.instrument)
            .ok_or(RejectReason::UnknownInstrument)?;
        if let Some(limit) = order.order_type.limit_price() {
            if !(limit.is_finite() && limit > 0.0) {
                return Err(RejectReason::InvalidLimitPrice(limit));
            }
        }

        let direction = order.direction();
        let held = booking.quantity(&order.instrument, direction);
        if !instrument.is_whole_lot(order.quantity) {
            let closes_everything = order.position_effect == PositionEffect::Close
                && (order.quantity - held).abs() < EPS;
            if !closes_everything {
                return Err(RejectReason::InvalidLotSize {
                    quantity: order.quantity,
                    lot_size: instrument.lot_size,
                });
            }
        }

        if self.suspended_orders == SuspendedOrderPolicy::Reject
            && market.data.is_suspended(&order.instrument, market.timestamp)
        {
            return Err(RejectReason::Suspended);
        }

        let last_price = market
            .prices
            .get_last_price(&order.instrument)
            .ok_or(RejectReason::PriceUnavailable)?;

        match (order.side, order.position_effect) {
            (Side::Sell, PositionEffect::Open) if !self.allow_short => {
                return Err(RejectReason::ShortNotAllowed);
            }
            (_, PositionEffect::Close) => {
                let available = held - book.pending_close_quantity(&order.instrument, direction);
                if order.quantity > available + EPS {
                    return Err(RejectReason::InsufficientPosition {
                        requested: order.quantity,
                        available: available.max(0.0),
                    });
                }
            }
            _ => {}
        }

        if order.side == Side::Buy {
            let reference = order.order_type.limit_price().unwrap_or(last_price);
            let price = slipped_price(
                reference,
                order.side,
                &order.order_type,
                self.slippage_ratio,
                instrument,
            );
            let required = price * order.quantity
                + self.cost.estimate(instrument, order.side, price, order.quantity);
            let available =
                booking.cash() - booking.margin_floor() - book.committed_cash(market.prices);
            if required > available + EPS {
                return Err(RejectReason::InsufficientCash {
                    required,
                    available: available.max(0.0),
                });
            }
        }
        Ok(())
    }

    /// One matching pass over every open order, in id order. Returns the
    /// fills applied to `booking` during the pass.
    pub fn match_orders(
        &self,
        book: &mut OrderBook,
        ids: &mut IdGen,
        market: &MarketView<'_>,
        snapshot: &BarSnapshot,
        booking: &mut Booking,
    ) -> Result<Vec<Fill>, MatchError> {
        self.expire_stale(book, market.bar_seq)?;

        let mut fills = Vec::new();
        let mut matched_volume: BTreeMap<InstrumentId, f64> = BTreeMap::new();

        for order_id in book.open_order_ids() {
            let Some(order) = book.get(order_id) else {
                continue;
            };
            if !self.policy.is_eligible(order, market.bar_seq) {
                continue;
            }
            let Some(bar) = snapshot.get(&order.instrument) else {
                continue;
            };
            if market.data.is_suspended(&order.instrument, market.timestamp) {
                continue;
            }
            let Some(instrument) = market.data.instrument(&order.instrument) else {
                continue;
            };

            let reference = match order.order_type {
                OrderType::Market => self.policy.market_price(bar),
                OrderType::Limit { limit_price } => {
                    match self.policy.limit_price(bar, order.side, limit_price) {
                        Some(price) => price,
                        None => continue,
                    }
                }
            };
            let price = slipped_price(
                reference,
                order.side,
                &order.order_type,
                self.slippage_ratio,
                instrument,
            );

            let remaining = order.remaining_quantity();
            let (quantity, remainder) = match &self.liquidity {
                Some(liquidity) => {
                    let already = matched_volume.get(&order.instrument).copied().unwrap_or(0.0);
                    liquidity.constrain(instrument, remaining, bar.volume, already)
                }
                None => (remaining, 0.0),
            };
            let cancel_remainder = remainder > EPS
                && self.liquidity.map(|l| l.remainder) == Some(RemainderPolicy::Cancel);

            if quantity <= EPS {
                if cancel_remainder {
                    book.cancel(order_id, market.bar_seq, "volume limit")?;
                    tracing::warn!(order_id = %order_id, "remainder cancelled by volume limit");
                }
                continue;
            }

            if let Some(reason) = self.recheck(order, instrument, price, quantity, booking) {
                tracing::warn!(
                    order_id = %order_id,
                    instrument = %order.instrument,
                    reason = %reason,
                    "order rejected at matching"
                );
                book.reject(order_id, market.bar_seq, reason)?;
                continue;
            }

            let commission = self.cost.commission(order, price, quantity);
            let tax = self.cost.tax(instrument, order.side, price, quantity);
            let fill = Fill::new(
                ids.next_fill_id(),
                Some(order_id),
                order.instrument.clone(),
                order.side,
                order.position_effect,
                market.timestamp,
                price,
                quantity,
                commission,
                tax,
            );

            if let Err(source) = booking.apply_fill(fill.clone()) {
                tracing::error!(
                    order_id = %order_id,
                    instrument = %fill.instrument(),
                    error = %source,
                    "ledger refused fill"
                );
                return Err(MatchError::Ledger {
                    timestamp: market.timestamp,
                    instrument: fill.instrument().clone(),
                    order_id,
                    source,
                });
            }
            book.record_fill(order_id, quantity, price, commission, tax, market.bar_seq)?;
            *matched_volume.entry(fill.instrument().clone()).or_insert(0.0) += quantity;

            tracing::info!(
                fill_id = %fill.id(),
                order_id = %order_id,
                instrument = %fill.instrument(),
                side = %fill.side(),
                quantity,
                price,
                commission,
                tax,
                "fill"
            );

            if cancel_remainder {
                book.cancel(order_id, market.bar_seq, "volume limit")?;
            }
            fills.push(fill);
        }

        tracing::debug!(
            bar_seq = market.bar_seq,
            fills = fills.len(),
            open = book.open_count(),
            "matching pass"
        );
        Ok(fills)
    }

    /// Final cash and position check against the ledger as it stands now.
    fn recheck(
        &self,
        order: &Order,
        instrument: &Instrument,
        price: f64,
        quantity: f64,
        booking: &Booking,
    ) -> Option<RejectReason> {
        if order.position_effect == PositionEffect::Close {
            let available = booking.quantity(&order.instrument, order.direction());
            if quantity > available + EPS {
                return Some(RejectReason::InsufficientPosition {
                    requested: quantity,
                    available,
                });
            }
        }
        if order.side == Side::Buy {
            let required = price * quantity
                + self.cost.commission(order, price, quantity)
                + self.cost.tax(instrument, order.side, price, quantity);
            let available = booking.cash() - booking.margin_floor();
            if required > available + EPS {
                return Some(RejectReason::InsufficientCash {
                    required,
                    available: available.max(0.0),
                });
            }
        }
        None
    }

    fn expire_stale(&self, book: &mut OrderBook, bar_seq: u64) -> Result<(), OrderBookError> {
        let Some(window) = self.order_expiry_bars else {
            return Ok(());
        };
        let stale: Vec<OrderId> = book
            .open_orders()
            .filter(|o| o.age(bar_seq) > window)
            .map(|o| o.id)
            .collect();
        for id in stale {
            book.expire(id, bar_seq)?;
            tracing::warn!(order_id = %id, window, "order expired");
        }
        Ok(())
    }

    /// Cancel an open order on behalf of the strategy.
    pub fn cancel(
        &self,
        book: &mut OrderBook,
        order_id: OrderId,
        bar_seq: u64,
    ) -> Result<(), OrderBookError> {
        book.cancel(order_id, bar_seq, "user")?;
        tracing::debug!(order_id = %order_id, "order cancelled");
        Ok(())
    }
}
