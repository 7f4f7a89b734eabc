//! Simulation engine: event clock, matching, ledgers and reporting.
//!
//! One run owns an `Environment`; the event clock in `event_loop` advances it
//! bar by bar and calls into the user `Strategy` through a `StrategyContext`.

pub mod benchmark;
pub mod booking;
pub mod config;
pub mod environment;
pub mod event_loop;
pub mod execution;
pub mod matcher;
pub mod order_book;
pub mod positions;
pub mod price_board;
pub mod report;

pub use benchmark::{BenchmarkAccount, RebalanceSchedule};
pub use booking::{Booking, BookingError};
pub use config::{
    BenchmarkConfig, ConfigError, EndOfRunPolicy, MissingBarPolicy, SimulationConfig,
    SuspendedOrderPolicy,
};
pub use environment::{Environment, PhaseError, RunPhase, StrategyContext};
pub use event_loop::{run_backtest, EquityPoint, RunControl, RunError, RunResult};
pub use execution::{
    CostConfig, CostModel, LiquidityPolicy, MatchingPolicy, MatchingType, RemainderPolicy,
};
pub use matcher::{MarketView, MatchError, Matcher};
pub use order_book::{OrderAuditEntry, OrderBook, OrderBookError};
pub use positions::BookingPositions;
pub use price_board::{BarPriceBoard, PriceBoard};
pub use report::{BarReport, LedgerSnapshot, NullSink, PositionSnapshot, ReportSink, SnapshotRecorder};
