// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for chunk packing.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use memory_planner::AllocationTable;
use tensor_core::{DType, TensorDesc, TensorDims, TensorLayout};

/// A chain of `n` records where every fourth one also feeds an op eight
/// steps later and every eighth pair is linked, roughly what an encoder /
/// decoder network produces.
fn table(n: usize) -> AllocationTable {
    let mut t = AllocationTable::new();
    let mut prev = None;
    for i in 0..n {
        let c = 16 + (i * 13) % 96;
        let desc = TensorDesc::dense(TensorDims::chw(c, 64, 64), TensorLayout::Chw, DType::F16).unwrap();
        let id = t.push(desc, i);
        t.extend_lifetime(id, (i + 1).min(n - 1));
        if i % 4 == 0 {
            t.extend_lifetime(id, (i + 8).min(n - 1));
        }
        if let (0, Some(p)) = (i % 8, prev) {
            let _ = t.link(p, id);
        }
        prev = Some(id);
    }
    t
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for n in [32usize, 128, 512] {
        let base = table(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &base, |b, base| {
            b.iter(|| {
                let mut t = base.clone();
                black_box(t.plan())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan);
criterion_main!(benches);
