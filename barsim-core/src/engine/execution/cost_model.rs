//! Cost models: commission and transaction tax per fill.
//!
//! Commission is charged on every side. Tax is charged on sells of taxable
//! instruments only. A minimum commission applies per order, not per fill:
//! partial fills of one order share a single minimum.

use crate::domain::{Instrument, Order, Side};
use serde::{Deserialize, Serialize};

/// Fee calculation for a single fill.
pub trait CostModel: Send + Sync {
    /// Commission owed for matching `quantity` of `order` at `price`, given
    /// what the order has already paid.
    fn commission(&self, order: &Order, price: f64, quantity: f64) -> f64;

    /// Transaction tax owed for the trade.
    fn tax(&self, instrument: &Instrument, side: Side, price: f64, quantity: f64) -> f64;

    /// Upper estimate of fees on a fresh order, used for cash checks at
    /// submission.
    fn estimate(&self, instrument: &Instrument, side: Side, price: f64, quantity: f64) -> f64;
}

/// Zero commission, zero tax.
#[derive(Debug, Clone, Copy, Default)]
pub struct Frictionless;

impl CostModel for Frictionless {
    fn commission(&self, _order: &Order, _price: f64, _quantity: f64) -> f64 {
        0.0
    }

    fn tax(&self, _instrument: &Instrument, _side: Side, _price: f64, _quantity: f64) -> f64 {
        0.0
    }

    fn estimate(&self, _instrument: &Instrument, _side: Side, _price: f64, _quantity: f64) -> f64 {
        0.0
    }
}

/// Proportional commission with a per-order minimum, plus sell-side tax.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBased {
    pub commission_rate: f64,
    pub min_commission: f64,
    pub tax_rate: f64,
}

impl RateBased {
    pub fn new(commission_rate: f64, min_commission: f64, tax_rate: f64) -> Self {
        Self {
            commission_rate,
            min_commission,
            tax_rate,
        }
    }
}

impl CostModel for RateBased {
    fn commission(&self, order: &Order, price: f64, quantity: f64) -> f64 {
        // Total over the order's life is max(Σ notional × rate, minimum).
        let before = order.filled_quantity() * order.avg_fill_price() * self.commission_rate;
        let now = price * quantity * self.commission_rate;
        let total = (before + now).max(self.min_commission);
        (total - order.commission_paid()).max(0.0)
    }

    fn tax(&self, instrument: &Instrument, side: Side, price: f64, quantity: f64) -> f64 {
        if side == Side::Sell && instrument.is_taxable_on_sell() {
            price * quantity * self.tax_rate
        } else {
            0.0
        }
    }

    fn estimate(&self, instrument: &Instrument, side: Side, price: f64, quantity: f64) -> f64 {
        let commission = (price * quantity * self.commission_rate).max(self.min_commission);
        commission + self.tax(instrument, side, price, quantity)
    }
}

/// Serializable selection of the cost model for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostConfig {
    Frictionless,
    RateBased {
        #[serde(default = "default_commission_rate")]
        commission_rate: f64,
        #[serde(default = "default_min_commission")]
        min_commission: f64,
        #[serde(default = "default_tax_rate")]
        tax_rate: f64,
    },
}

fn default_commission_rate() -> f64 {
    0.0008
}

fn default_min_commission() -> f64 {
    5.0
}

fn default_tax_rate() -> f64 {
    0.001
}

impl Default for CostConfig {
    fn default() -> Self {
        Self::RateBased {
            commission_rate: default_commission_rate(),
            min_commission: default_min_commission(),
            tax_rate: default_tax_rate(),
        }
    }
}

impl CostConfig {
    pub fn build(&self) -> Box<dyn CostModel> {
        match *self {
            Self::Frictionless => Box::new(Frictionless),
            Self::RateBased {
                commission_rate,
                min_commission,
                tax_rate,
            } => Box::new(RateBased::new(commission_rate, min_commission, tax_rate)),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Frictionless => Ok(()),
            Self::RateBased {
                commission_rate,
                min_commission,
                tax_rate,
            } => {
                for (name, value) in [
                    ("commission_rate", commission_rate),
                    ("min_commission", min_commission),
                    ("tax_rate", tax_rate),
                ] {
                    if !(value.is_finite() && value >= 0.0) {
                        return Err(format!("{name} must be non-negative, got {value}"));
                    }
                }
                Ok(())
            }
        }
    }
}
