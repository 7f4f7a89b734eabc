//! Criterion benchmarks for barsim hot paths.
//!
//! Benchmarks:
//! 1. Bar event loop (full backtest over N bars)
//! 2. Ledger fill application
//! 3. Order book insert and fill

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use barsim_core::data::InMemoryDataSource;
use barsim_core::domain::{
    Bar, BarSnapshot, Fill, FillId, Instrument, Order, OrderId, OrderRequest, PositionEffect, Side,
};
use barsim_core::engine::{
    run_backtest, Booking, NullSink, OrderBook, RunControl, SimulationConfig, StrategyContext,
};
use barsim_core::Strategy;
use chrono::{Duration, NaiveDate, NaiveDateTime};

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 2)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap()
}

fn make_source(n: usize, instruments: usize) -> InMemoryDataSource {
    let mut data = InMemoryDataSource::new();
    for k in 0..instruments {
        let id = format!("S{k:03}");
        data.add_instrument(Instrument::cn_stock(id.as_str()));
        for i in 0..n {
            let close = 100.0 + ((i + k) as f64 * 0.1).sin() * 10.0;
            data.add_bar(Bar {
                instrument: id.as_str().into(),
                timestamp: start() + Duration::days(i as i64),
                open: close - 0.3,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000.0,
            });
        }
    }
    data
}

/// Rotates a fixed slice of the account through every instrument.
struct Rotator {
    instruments: Vec<String>,
}

impl Strategy for Rotator {
    fn init(&mut self, ctx: &mut StrategyContext<'_, '_>) {
        ctx.update_universe(self.instruments.iter().map(String::as_str));
    }

    fn handle_bar(&mut self, ctx: &mut StrategyContext<'_, '_>, bars: &BarSnapshot) {
        let seq = ctx.bar_seq() as usize;
        let pick = &self.instruments[seq % self.instruments.len()];
        for bar in bars.iter() {
            let target = if bar.instrument.as_str() == pick { 0.5 } else { 0.0 };
            let _ = ctx.order_target_percent(bar.instrument.clone(), target);
        }
    }
}

// ── 1. Event loop ────────────────────────────────────────────────────

fn bench_event_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_loop");
    for &(bars, instruments) in &[(250usize, 1usize), (1_000, 1), (250, 10)] {
        let data = make_source(bars, instruments);
        let names: Vec<String> = (0..instruments).map(|k| format!("S{k:03}")).collect();
        group.bench_with_input(
            BenchmarkId::new("bars_x_instruments", format!("{bars}x{instruments}")),
            &data,
            |b, data| {
                b.iter(|| {
                    let mut strategy = Rotator {
                        instruments: names.clone(),
                    };
                    let result = run_backtest(
                        data,
                        &mut strategy,
                        SimulationConfig::new(1_000_000.0),
                        &mut NullSink,
                        &RunControl::new(),
                    );
                    black_box(result.map(|r| r.fingerprint))
                })
            },
        );
    }
    group.finish();
}

// ── 2. Ledger ────────────────────────────────────────────────────────

fn bench_booking(c: &mut Criterion) {
    c.bench_function("booking/round_trips_1000", |b| {
        b.iter(|| {
            let mut booking = Booking::new(1_000_000.0, 0.0);
            for i in 0..1_000u64 {
                let (side, effect) = if i % 2 == 0 {
                    (Side::Buy, PositionEffect::Open)
                } else {
                    (Side::Sell, PositionEffect::Close)
                };
                let fill = Fill::new(
                    FillId(i + 1),
                    Some(OrderId(i + 1)),
                    "S000".into(),
                    side,
                    effect,
                    start(),
                    100.0 + (i % 7) as f64,
                    100.0,
                    5.0,
                    0.0,
                );
                let _ = booking.apply_fill(fill);
            }
            black_box(booking.total_value())
        })
    });
}

// ── 3. Order book ────────────────────────────────────────────────────

fn bench_order_book(c: &mut Criterion) {
    c.bench_function("order_book/insert_fill_1000", |b| {
        b.iter(|| {
            let mut book = OrderBook::new();
            for i in 1..=1_000u64 {
                book.insert(Order::new(
                    OrderId(i),
                    OrderRequest::market("S000", Side::Buy, 200.0),
                    start(),
                    i,
                ));
                let _ = book.record_fill(OrderId(i), 100.0, 10.0, 0.0, 0.0, i);
                let _ = book.record_fill(OrderId(i), 100.0, 10.5, 0.0, 0.0, i);
            }
            black_box(book.open_count())
        })
    });
}

criterion_group!(benches, bench_event_loop, bench_booking, bench_order_book);
criterion_main!(benches);
