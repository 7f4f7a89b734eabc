//! Domain types: bars, instruments, orders, fills, positions.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;

pub use bar::{Bar, BarSnapshot};
pub use fill::Fill;
pub use ids::{FillId, IdGen, InstrumentId, OrderId};
pub use instrument::{AssetClass, Instrument};
pub use order::{
    Direction, InvalidTransition, Order, OrderEvent, OrderRejected, OrderRequest, OrderStatus,
    OrderType, PositionEffect, RejectReason, Side,
};
pub use position::Position;
