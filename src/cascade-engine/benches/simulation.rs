// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cascade_engine::datamodel::Units;
use cascade_engine::test_common::TestFramework;
use cascade_engine::{Job, Settings, run_many};

fn build_sir_framework(stop: f64) -> TestFramework {
    TestFramework::new()
        .with_sim_time(2000.0, stop, 0.25)
        .source("births")
        .comp("sus")
        .comp("inf")
        .comp("rec")
        .junction("diagnosis")
        .sink("dead")
        .charac("alive", &["sus", "inf", "rec"], None)
        .charac("prev", &["inf"], Some("alive"))
        .par("beta", None, Units::Number)
        .par("foi", Some("min(beta * prev, 1)"), Units::Probability)
        .par("recovery", None, Units::Probability)
        .par("death", None, Units::Probability)
        .par("b_rate", None, Units::Probability)
        .par("diagnosed", None, Units::Probability)
        .par("treated", None, Units::Fraction)
        .par("untreated", None, Units::Fraction)
        .link("b_rate", "births", "sus")
        .link("foi", "sus", "inf")
        .link("recovery", "inf", "rec")
        .link("death", "sus", "dead")
        .link("death", "inf", "dead")
        .link("death", "rec", "dead")
        .link("diagnosed", "inf", "diagnosis")
        .link("treated", "diagnosis", "rec")
        .link("untreated", "diagnosis", "inf")
        .data("beta", 2.0)
        .data("recovery", 0.2)
        .data("death", 0.01)
        .data("b_rate", 0.015)
        .data("diagnosed", 0.3)
        .data("treated", 0.8)
        .data("untreated", 0.2)
        .data("alive", 1e6)
        .data("prev", 0.01)
        .data("rec", 0.0)
        .data("diagnosis", 0.0)
}

fn bench_build(c: &mut Criterion) {
    let tf = build_sir_framework(2100.0);

    c.bench_function("build", |b| b.iter(|| tf.build_model().unwrap()));
}

fn bench_run_simulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("run_simulation");
    group.measurement_time(Duration::from_secs(10));

    for &years in &[10, 100, 1_000] {
        let tf = build_sir_framework(2000.0 + years as f64);

        group.bench_with_input(BenchmarkId::from_parameter(years), &tf, |b, tf| {
            b.iter(|| tf.run().unwrap())
        });
    }
    group.finish();
}

fn bench_run_many(c: &mut Criterion) {
    let tf = build_sir_framework(2100.0);
    let framework = tf.framework();

    c.bench_function("run_many/64", |b| {
        b.iter(|| {
            let jobs = (0..64)
                .map(|_| Job::new(tf.parset(), Settings::default()))
                .collect();
            run_many(&framework, &tf.sim_specs, jobs)
        })
    });
}

criterion_group!(benches, bench_build, bench_run_simulation, bench_run_many);
criterion_main!(benches);
