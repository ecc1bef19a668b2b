// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the tiling search and tile iteration.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use memory_planner::MemoryBudget;
use tiling_planner::{search, BuildOutcome, TileBuilder, TilingParams};

struct AreaBuilder;

impl TileBuilder for AreaBuilder {
    type Error = std::convert::Infallible;

    fn try_build(&mut self, h: usize, w: usize, budget: Option<usize>) -> Result<BuildOutcome, Self::Error> {
        let bytes = h * w * 240;
        Ok(match budget {
            Some(b) if bytes > b => BuildOutcome::OverBudget { required_bytes: bytes },
            _ => BuildOutcome::Built { memory_bytes: bytes },
        })
    }
}

fn params_4k(budget_mb: usize) -> TilingParams {
    TilingParams {
        height: 2160,
        width: 3840,
        alignment: 16,
        overlap: 96,
        num_engines: 2,
        budget: MemoryBudget::from_mb(budget_mb),
    }
}

fn bench_search(c: &mut Criterion) {
    for mb in [1200usize, 300, 50] {
        let p = params_4k(mb);
        c.bench_function(&format!("search_4k_{mb}mb"), |b| {
            b.iter(|| search(black_box(&p), &mut AreaBuilder).unwrap())
        });
    }
}

fn bench_regions(c: &mut Criterion) {
    let plan = search(&params_4k(50), &mut AreaBuilder).unwrap();
    c.bench_function("regions_4k", |b| b.iter(|| black_box(plan.regions().map(|r| r.output.width).sum::<usize>())));
}

criterion_group!(benches, bench_search, bench_regions);
criterion_main!(benches);
