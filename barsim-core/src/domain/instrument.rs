use super::ids::InstrumentId;
use serde::{Deserialize, Serialize};

/// Instrument metadata: round lot, tick size, asset class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Round lot. Buy quantities must be whole multiples of it.
    pub lot_size: f64,
    pub tick_size: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetClass {
    Stock,
    Fund,
    Index,
    Future,
}

impl Instrument {
    pub fn new(
        id: impl Into<InstrumentId>,
        symbol: impl Into<String>,
        asset_class: AssetClass,
        lot_size: f64,
        tick_size: f64,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            asset_class,
            lot_size,
            tick_size,
        }
    }

    /// A-share common stock: 100-share lots, 0.01 tick.
    pub fn cn_stock(id: impl Into<InstrumentId>) -> Self {
        let id = id.into();
        let symbol = id.0.clone();
        Self::new(id, symbol, AssetClass::Stock, 100.0, 0.01)
    }

    /// Single-unit lots, 0.01 tick. Convenient for tests and index tracking.
    pub fn unit_lot(id: impl Into<InstrumentId>, asset_class: AssetClass) -> Self {
        let id = id.into();
        let symbol = id.0.clone();
        Self::new(id, symbol, asset_class, 1.0, 0.01)
    }

    /// Whether selling this instrument incurs transaction (stamp) tax.
    pub fn is_taxable_on_sell(&self) -> bool {
        self.asset_class == AssetClass::Stock
    }

    /// Largest whole-lot quantity not exceeding `qty`.
    pub fn round_down_to_lot(&self, qty: f64) -> f64 {
        if self.lot_size <= 0.0 || qty <= 0.0 {
            return qty.max(0.0);
        }
        // Nudge before flooring so 299.99999999 lots counts as 300.
        (qty / self.lot_size + 1e-9).floor() * self.lot_size
    }

    /// Whether `qty` is a whole multiple of the lot size.
    pub fn is_whole_lot(&self, qty: f64) -> bool {
        if self.lot_size <= 0.0 {
            return true;
        }
        let lots = qty / self.lot_size;
        (lots - lots.round()).abs() < 1e-9
    }

    /// Round a price to the nearest tick.
    pub fn round_price(&self, price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return price;
        }
        (price / self.tick_size).round() * self.tick_size
    }
}
