//! Benchmarks for turnip price forecasting.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stalk::prelude::*;

/// Deterministic "random" week with `observed` slots filled in
fn make_record(buy: u32, observed: usize) -> WeeklyRecord {
  let mut record = WeeklyRecord::new();
  record.set_buy_price(buy).unwrap();
  for (i, slot) in Slot::all().take(observed).enumerate() {
    let price = buy * (85 - 4 * i as u32) / 100;
    record.set_sell_price(slot, price);
  }
  record
}

fn bench_build(c: &mut Criterion) {
  c.bench_function("build_engine", |b| b.iter(|| EngineBuilder::new().build().unwrap()));
}

fn bench_forecast(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();

  c.bench_function("forecast_blank_week", |b| {
    let record = make_record(100, 0);
    b.iter(|| engine.forecast(black_box(&record)).unwrap())
  });

  let mut group = c.benchmark_group("observed_slots");
  for observed in [1, 3, 6, 9].iter() {
    let record = make_record(100, *observed);
    group.bench_with_input(BenchmarkId::new("forecast", observed), observed, |b, _| {
      b.iter(|| engine.forecast(black_box(&record)).unwrap())
    });
  }
  group.finish();
}

fn bench_parallel(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let ids: Vec<ParticipantId> = (0..256).map(|i| ParticipantId::new(format!("island-{i}"))).collect();
  let records: Vec<WeeklyRecord> = (0..256u32).map(|i| make_record(90 + i % 21, (i % 5) as usize)).collect();

  c.bench_function("parallel_forecast_256_participants", |b| {
    b.iter(|| {
      let pairs: Vec<(&ParticipantId, &WeeklyRecord)> = ids.iter().zip(records.iter()).collect();
      forecast_parallel(&engine, black_box(pairs))
    })
  });
}

criterion_group!(benches, bench_build, bench_forecast, bench_parallel);
criterion_main!(benches);
