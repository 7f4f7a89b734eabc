//! Integration tests for the event clock.
//!
//! Tests:
//! 1. Callback order and run phases across trading dates
//! 2. Determinism: identical runs share a fingerprint
//! 3. Calendar validation, missing-bar policies, config validation
//! 4. Cooperative stop and end-of-run order handling
//! 5. Benchmark tracking and per-bar reports

use barsim_core::data::{DataError, InMemoryDataSource};
use barsim_core::domain::{AssetClass, Bar, BarSnapshot, Instrument, OrderRequest, OrderStatus, Side};
use barsim_core::engine::{
    run_backtest, BenchmarkConfig, EndOfRunPolicy, MatchingType, MissingBarPolicy, NullSink,
    RunControl, RunError, RunPhase, RunResult, SimulationConfig, SnapshotRecorder,
    StrategyContext,
};
use barsim_core::Strategy;
use chrono::{NaiveDate, NaiveDateTime};

// ── Helpers ──────────────────────────────────────────────────────────

fn at(d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn day(d: u32) -> NaiveDateTime {
    at(d, 15)
}

fn bar(id: &str, timestamp: NaiveDateTime, close: f64) -> Bar {
    Bar {
        instrument: id.into(),
        timestamp,
        open: close,
        high: close + 0.5,
        low: close - 0.5,
        close,
        volume: 1_000_000.0,
    }
}

/// Ten daily bars of a gently rising stock `X` and a fund `B`.
fn market() -> InMemoryDataSource {
    let mut data = InMemoryDataSource::new()
        .with_instrument(Instrument::cn_stock("X"))
        .with_instrument(Instrument::unit_lot("B", AssetClass::Fund));
    for d in 2..12 {
        data.add_bar(bar("X", day(d), 10.0 + f64::from(d) * 0.1));
        data.add_bar(bar("B", day(d), 1.0 + f64::from(d) * 0.01));
    }
    data
}

/// Buys on the first bar, sells half on the fifth.
#[derive(Default)]
struct BuySellHalf;

impl Strategy for BuySellHalf {
    fn name(&self) -> &str {
        "buy-sell-half"
    }

    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe(["X"]);
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, _bars: &BarSnapshot) {
        match ctx.bar_seq() {
            1 => {
                ctx.order_percent("X", 0.8).unwrap();
            }
            5 => {
                ctx.order_target_percent("X", 0.4).unwrap();
            }
            _ => {}
        }
    }
}

fn run(data: &InMemoryDataSource, config: SimulationConfig) -> Result<RunResult, RunError> {
    run_backtest(
        data,
        &mut BuySellHalf,
        config,
        &mut NullSink,
        &RunControl::new(),
    )
}

// ── 1. Callback order ────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl Strategy for Recorder {
    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        assert_eq!(ctx.phase(), RunPhase::Initializing);
        ctx.update_universe(["X"]);
        self.events.push("init".into());
    }

    fn before_trading(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        assert_eq!(ctx.phase(), RunPhase::BeforeTrading);
        let date = ctx.now().unwrap().date();
        self.events.push(format!("before {date}"));
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot) {
        assert_eq!(ctx.phase(), RunPhase::BarProcessing);
        assert_eq!(bars.len(), 1);
        self.events.push(format!("bar {}", ctx.bar_seq()));
    }

    fn after_trading(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        assert_eq!(ctx.phase(), RunPhase::AfterTrading);
        let date = ctx.now().unwrap().date();
        self.events.push(format!("after {date}"));
    }
}

#[test]
fn callbacks_follow_the_trading_day() {
    // Two intraday bars on each of two dates.
    let data = InMemoryDataSource::new()
        .with_instrument(Instrument::cn_stock("X"))
        .with_bars([
            bar("X", at(2, 10), 10.0),
            bar("X", at(2, 15), 10.1),
            bar("X", at(3, 10), 10.2),
            bar("X", at(3, 15), 10.3),
        ]);
    let mut strategy = Recorder::default();
    let result = run_backtest(
        &data,
        &mut strategy,
        SimulationConfig::default(),
        &mut NullSink,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(
        strategy.events,
        vec![
            "init",
            "before 2024-01-02",
            "bar 1",
            "bar 2",
            "after 2024-01-02",
            "before 2024-01-03",
            "bar 3",
            "bar 4",
            "after 2024-01-03",
        ]
    );
    assert_eq!(result.bar_count, 4);
    assert!(!result.stopped);
}

#[test]
fn empty_calendar_finishes_without_callbacks() {
    let data = InMemoryDataSource::new().with_instrument(Instrument::cn_stock("X"));
    let mut strategy = Recorder::default();
    let result = run_backtest(
        &data,
        &mut strategy,
        SimulationConfig::default(),
        &mut NullSink,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(strategy.events, vec!["init"]);
    assert_eq!(result.bar_count, 0);
    assert!(result.equity.is_empty());
    assert_eq!(result.final_value(), 100_000.0);
}

/// Buys 100 `X` before trading opens on the second date.
struct PreOpenBuyer;

impl Strategy for PreOpenBuyer {
    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe(["X"]);
    }

    fn before_trading(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        if ctx.bar_seq() == 2 {
            ctx.submit_order(OrderRequest::market("X", Side::Buy, 100.0))
                .unwrap();
        }
    }

    fn handle_bar(&mut self, _ctx: &mut StrategyContext<'_, '_>, _bars: &BarSnapshot) {}
}

#[test]
fn pre_open_orders_fill_at_that_days_open() {
    let data = market();
    let result = run_backtest(
        &data,
        &mut PreOpenBuyer,
        SimulationConfig::frictionless(100_000.0).with_matching(MatchingType::NextBarOpen),
        &mut NullSink,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(result.orders[0].submitted_seq, 1);
    assert_eq!(result.fills.len(), 1);
    assert_eq!(result.fills[0].timestamp(), day(3));
    assert!((result.fills[0].price() - 10.3).abs() < 1e-9);
}

#[test]
fn pre_open_orders_fill_at_that_days_close() {
    let data = market();
    let result = run_backtest(
        &data,
        &mut PreOpenBuyer,
        SimulationConfig::frictionless(100_000.0),
        &mut NullSink,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(result.fills.len(), 1);
    assert_eq!(result.fills[0].timestamp(), day(3));
}

// ── 2. Determinism ───────────────────────────────────────────────────

#[test]
fn identical_runs_share_a_fingerprint() {
    let data = market();
    let config = SimulationConfig::new(50_000.0).with_benchmark(BenchmarkConfig::single("B"));
    let a = run(&data, config.clone()).unwrap();
    let b = run(&data, config).unwrap();

    assert!(!a.fills.is_empty());
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_eq!(a.equity, b.equity);
    assert_eq!(a.final_account, b.final_account);
}

#[test]
fn different_costs_change_the_fingerprint() {
    let data = market();
    let a = run(&data, SimulationConfig::new(50_000.0)).unwrap();
    let b = run(&data, SimulationConfig::frictionless(50_000.0)).unwrap();
    assert_ne!(a.fingerprint, b.fingerprint);
}

// ── 3. Validation and missing data ───────────────────────────────────

#[test]
fn non_monotonic_calendar_is_refused() {
    let data = market().with_calendar(vec![day(3), day(2)]);
    let err = run(&data, SimulationConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        RunError::NonMonotonicTime { previous, next } if previous == day(3) && next == day(2)
    ));
}

#[test]
fn invalid_config_is_refused_before_the_first_bar() {
    let err = run(&market(), SimulationConfig::new(-1.0)).unwrap_err();
    assert!(matches!(err, RunError::Config(_)));
}

fn gappy_market() -> InMemoryDataSource {
    // X has no bar on the 3rd; Y keeps the calendar going.
    InMemoryDataSource::new()
        .with_instrument(Instrument::cn_stock("X"))
        .with_instrument(Instrument::cn_stock("Y"))
        .with_bars([
            bar("X", day(2), 10.0),
            bar("Y", day(2), 20.0),
            bar("Y", day(3), 20.0),
            bar("X", day(4), 11.0),
            bar("Y", day(4), 20.0),
        ])
}

#[test]
fn missing_bar_is_skipped_by_default() {
    let result = run(&gappy_market(), SimulationConfig::new(50_000.0)).unwrap();
    assert_eq!(result.bar_count, 3);
    assert_eq!(result.equity.len(), 3);
}

#[test]
fn missing_bar_aborts_when_configured() {
    let mut config = SimulationConfig::new(50_000.0);
    config.missing_bar = MissingBarPolicy::Abort;
    let err = run(&gappy_market(), config).unwrap_err();
    assert!(matches!(
        err,
        RunError::Data(DataError::Unavailable { timestamp, .. }) if timestamp == day(3)
    ));
}

// ── 4. Stop and end of run ───────────────────────────────────────────

struct StopAfter {
    control: RunControl,
    bars: u64,
}

impl Strategy for StopAfter {
    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe(["X"]);
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, _bars: &BarSnapshot) {
        if ctx.bar_seq() == self.bars {
            self.control.stop();
        }
    }
}

#[test]
fn stop_flag_ends_the_run_between_bars() {
    let control = RunControl::new();
    let mut strategy = StopAfter {
        control: control.clone(),
        bars: 3,
    };
    let result = run_backtest(
        &market(),
        &mut strategy,
        SimulationConfig::default(),
        &mut NullSink,
        &control,
    )
    .unwrap();

    assert!(result.stopped);
    assert_eq!(result.bar_count, 3);
    assert_eq!(result.equity.len(), 3);
}

/// Places a limit buy far below the market on the first bar.
struct Lowball;

impl Strategy for Lowball {
    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe(["X"]);
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, _bars: &BarSnapshot) {
        if ctx.bar_seq() == 1 {
            ctx.submit_order(OrderRequest::limit("X", Side::Buy, 100.0, 1.0))
                .unwrap();
        }
    }
}

fn lowball(end_of_run: EndOfRunPolicy) -> RunResult {
    let mut config = SimulationConfig::default();
    config.end_of_run = end_of_run;
    run_backtest(&market(), &mut Lowball, config, &mut NullSink, &RunControl::new()).unwrap()
}

#[test]
fn open_orders_are_cancelled_at_the_end() {
    let result = lowball(EndOfRunPolicy::Cancel);
    assert_eq!(
        result.orders[0].status(),
        &OrderStatus::Cancelled {
            reason: "run finished".into()
        }
    );
    let last = result.audit_trail.last().unwrap();
    assert_eq!(last.bar_seq, 10);
}

#[test]
fn open_orders_can_expire_at_the_end() {
    let result = lowball(EndOfRunPolicy::Expire);
    assert_eq!(result.orders[0].status(), &OrderStatus::Expired);
}

// ── 5. Benchmark and reports ─────────────────────────────────────────

#[test]
fn benchmark_tracks_an_unsubscribed_instrument() {
    let data = market();
    let config = SimulationConfig::new(10_000.0).with_benchmark(BenchmarkConfig::single("B"));
    let result = run(&data, config).unwrap();

    // Bought once on the first bar: 10_000 / 1.02 rounded down to whole units.
    assert_eq!(result.benchmark_fills.len(), 1);
    let bought = result.benchmark_fills[0].quantity();
    assert_eq!(bought, 9_803.0);

    let benchmark = result.final_benchmark.as_ref().unwrap();
    let expected = 10_000.0 - bought * 1.02 + bought * 1.11;
    assert!((benchmark.total_value - expected).abs() < 1e-6);
    assert!(result.equity.iter().all(|p| p.benchmark.is_some()));
}

#[test]
fn no_benchmark_means_no_benchmark_curve() {
    let result = run(&market(), SimulationConfig::default()).unwrap();
    assert!(result.final_benchmark.is_none());
    assert!(result.benchmark_fills.is_empty());
    assert!(result.equity.iter().all(|p| p.benchmark.is_none()));
}

#[test]
fn recorder_receives_one_report_per_bar() {
    let data = market();
    let mut recorder = SnapshotRecorder::new();
    let result = run_backtest(
        &data,
        &mut BuySellHalf,
        SimulationConfig::new(50_000.0).with_benchmark(BenchmarkConfig::single("B")),
        &mut recorder,
        &RunControl::new(),
    )
    .unwrap();

    assert_eq!(recorder.reports().len(), 10);
    let curve: Vec<f64> = result.equity.iter().map(|p| p.account).collect();
    assert_eq!(recorder.equity_curve(), curve);
    assert_eq!(recorder.benchmark_curve().map(|c| c.len()), Some(10));
    let seqs: Vec<u64> = recorder.reports().iter().map(|r| r.bar_seq).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
    assert_eq!(recorder.reports().last().unwrap().account, result.final_account);
}

#[test]
fn strategy_sells_down_to_target() {
    let result = run(&market(), SimulationConfig::frictionless(50_000.0)).unwrap();
    assert_eq!(result.fills.len(), 2);
    assert_eq!(result.fills[0].side(), Side::Buy);
    assert_eq!(result.fills[1].side(), Side::Sell);
    let held = result.final_account.positions[0].quantity;
    assert!(held > 0.0 && held < result.fills[0].quantity());
}
