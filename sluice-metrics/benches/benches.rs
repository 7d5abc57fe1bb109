use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sluice_metrics::parse_line;

const LINES: &[(&str, &str)] = &[
    ("counter", "api.requests:1|c"),
    ("sampled", "api.requests:1|c|@0.1"),
    ("timer", "api.response_time:57.125|ms"),
    ("exponent", "api.payload:1.5e3|h"),
    ("set", "api.users:4711|s"),
    ("spaces", "api requests by host:1|c"),
];

fn bench_parse_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_line");

    for (name, line) in LINES {
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter_batched_ref(
                || line.as_bytes().to_vec(),
                |buf| {
                    let _ = black_box(parse_line(buf));
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_line);
criterion_main!(benches);
