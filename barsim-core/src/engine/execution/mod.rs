//! Execution building blocks used by the matcher: matching policies, cost
//! models, slippage, and the liquidity cap.
//!
//! Each is chosen once from configuration at run start. None of them holds
//! mutable state; the order book and ledger stay with the matcher.

pub mod cost_model;
pub mod fill_price;
pub mod liquidity;
pub mod matching_policy;

pub use cost_model::{CostConfig, CostModel, Frictionless, RateBased};
pub use fill_price::slipped_price;
pub use liquidity::{LiquidityPolicy, RemainderPolicy};
pub use matching_policy::{CurrentBarClose, MatchingPolicy, MatchingType, NextBarOpen};
