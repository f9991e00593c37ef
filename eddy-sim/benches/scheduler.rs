use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use eddy_sim::{
    ExpectationScript, ProducerScript, StreamSpec, StreamTestHarness, builtin_scenarios,
};

fn bench_hot_fan_out(c: &mut Criterion) {
    let values: Vec<u32> = (0..1_000).collect();
    let harness = StreamTestHarness::default();

    c.bench_function("hot_fan_out_4x1000", |b| {
        b.iter(|| {
            let consumers = (0..4)
                .map(|_| ExpectationScript::new().values(values.iter().copied()))
                .collect();
            let report = harness
                .run_many(
                    StreamSpec::Hot,
                    ProducerScript::new().emit_all(values.iter().copied()),
                    consumers,
                )
                .unwrap();
            black_box(report.rounds)
        });
    });
}

fn bench_builtin_scenarios(c: &mut Criterion) {
    let scenarios = builtin_scenarios();
    let harness = StreamTestHarness::default();

    c.bench_function("builtin_scenarios", |b| {
        b.iter(|| {
            for scenario in &scenarios {
                black_box(scenario.check(&harness).unwrap().matched);
            }
        });
    });
}

criterion_group!(benches, bench_hot_fan_out, bench_builtin_scenarios);
criterion_main!(benches);
