//! Slippage: the adverse move between the reference price and the fill.
//!
//! Buyers pay more, sellers receive less. The slipped price is rounded to the
//! instrument's tick in the adverse direction, but a sell never drops below
//! one tick. Limit orders never fill past their limit, whatever the slippage.

use crate::domain::{Instrument, OrderType, Side};

/// Final fill price for a reference price chosen by the matching policy.
pub fn slipped_price(
    reference: f64,
    side: Side,
    order_type: &OrderType,
    slippage_ratio: f64,
    instrument: &Instrument,
) -> f64 {
    let mut price = reference;
    if slippage_ratio > 0.0 {
        price = match side {
            Side::Buy => round_up_to_tick(reference * (1.0 + slippage_ratio), instrument.tick_size),
            Side::Sell => {
                let floor = instrument.tick_size.min(reference);
                round_down_to_tick(reference * (1.0 - slippage_ratio), instrument.tick_size)
                    .max(floor)
            }
        };
    }
    match (order_type.limit_price(), side) {
        (Some(limit), Side::Buy) => price.min(limit),
        (Some(limit), Side::Sell) => price.max(limit),
        (None, _) => price,
    }
}

fn round_up_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick - 1e-9).ceil() * tick
}

fn round_down_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    (price / tick + 1e-9).floor() * tick
}
