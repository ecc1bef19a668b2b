// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for filter initialization (tiling search with real graph
//! builds) and tile submission on host engines.

use criterion::{criterion_group, criterion_main, Criterion};
use op_graph::{Engine, Progress};
use runtime::{host_engines, synthetic_weights, DenoiseFilter, FilterConfig};
use std::sync::Arc;
use tensor_core::DType;

fn filter(width: usize, height: usize, budget: Option<&str>) -> DenoiseFilter {
    let mut config = FilterConfig::new(width, height);
    config.num_engines = 2;
    config.memory_budget = budget.map(str::to_string);
    let engines: Vec<Arc<dyn Engine>> = host_engines(&config)
        .unwrap()
        .into_iter()
        .map(|h| h as Arc<dyn Engine>)
        .collect();
    let weights = Arc::new(synthetic_weights(config.inputs.channels(), DType::F16).unwrap());
    DenoiseFilter::new(engines, weights, config).unwrap()
}

fn bench_init(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_init");
    group.sample_size(10);
    for (name, w, h, budget) in [
        ("256x256", 256, 256, None),
        ("1080p_default", 1920, 1080, None),
        ("1080p_256mb", 1920, 1080, Some("256MB")),
    ] {
        let mut f = filter(w, h, budget);
        group.bench_function(name, |b| b.iter(|| f.init().unwrap().num_tiles()));
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut f = filter(1920, 1080, Some("256MB"));
    f.init().unwrap();
    let mut group = c.benchmark_group("filter_execute");
    group.sample_size(10);
    group.bench_function("1080p_256mb", |b| {
        b.iter(|| f.execute(&mut Progress::new()).unwrap().tiles_submitted)
    });
    group.finish();
}

criterion_group!(benches, bench_init, bench_execute);
criterion_main!(benches);
