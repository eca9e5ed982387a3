#[macro_use]
extern crate criterion;

use criterion::Criterion;

extern crate resnik;

use resnik::aggregator::{Aggregator, DisabledSubtypes};
use resnik::metric::Metric;
use std::time::Duration;

fn mk_aggregator() -> Aggregator {
    Aggregator::new(&[90.0, 99.0], Duration::new(0, 0), DisabledSubtypes::default()).unwrap()
}

fn receive_experiment() {
    let mut agg = mk_aggregator();
    for i in 0..10_000u64 {
        agg.receive(Metric::new("bench.timer", (i % 173) as f64).timer(), i);
        agg.receive(Metric::new("bench.counter", 1.0).counter(), i);
    }
}

fn flush_experiment() {
    let mut agg = mk_aggregator();
    for i in 0..10_000u64 {
        agg.receive(Metric::new("bench.timer", (i % 173) as f64).timer(), i);
    }
    agg.flush(Duration::new(10, 0));
    agg.reset();
}

fn benchmark(c: &mut Criterion) {
    c.bench_function("receive_20k_samples", |b| {
        b.iter(|| receive_experiment());
    });
    c.bench_function("flush_10k_timer_values", |b| {
        b.iter(|| flush_experiment());
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
