//! Correlation throughput over large target and event sets.

use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use flood_core::{DetectionEvent, MonitoredTarget, SeverityBreakpoints, correlate};

fn fixtures(targets: usize, events_per_target: usize) -> (Vec<MonitoredTarget>, Vec<DetectionEvent>) {
    let now = Utc::now();
    let targets: Vec<MonitoredTarget> = (0..targets)
        .map(|i| {
            let address = format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff);
            MonitoredTarget::new("bench", &address, "dest").unwrap()
        })
        .collect();

    let events = targets
        .iter()
        .flat_map(|t| {
            (0..events_per_target).map(move |j| {
                DetectionEvent::new(
                    format!("evt-{}-{j}", t.address),
                    t.address.to_string(),
                    now - Duration::seconds(j as i64),
                )
                .with_peaks(1e9 * j as f64, 1e5)
            })
        })
        .collect();

    (targets, events)
}

fn bench_correlate(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate");
    for size in [100usize, 1_000, 10_000] {
        let (targets, events) = fixtures(size, 3);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| correlate(black_box(&targets), black_box(&events)).len());
        });
    }
    group.finish();
}

fn bench_classify(c: &mut Criterion) {
    let breakpoints = SeverityBreakpoints::default();
    c.bench_function("classify", |b| {
        b.iter(|| breakpoints.classify(black_box(2e9), black_box(5e4)));
    });
}

criterion_group!(benches, bench_correlate, bench_classify);
criterion_main!(benches);
