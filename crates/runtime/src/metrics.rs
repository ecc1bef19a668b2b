// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Execution metrics of one filter run.

use std::time::Duration;
use tiling_planner::TilingPlan;

/// What one [`crate::DenoiseFilter::execute`] call did.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FilterMetrics {
    pub tile_h: usize,
    pub tile_w: usize,
    pub total_tiles: usize,
    /// Tiles whose ops were all submitted.
    pub tiles_submitted: usize,
    /// Tiles submitted per engine.
    pub tiles_per_engine: Vec<usize>,
    pub ops_per_tile: usize,
    /// Estimated device memory of all model instances.
    pub memory_bytes: usize,
    /// Time spent enqueueing work.
    pub submit_duration: Duration,
    /// Submission plus the final barrier.
    pub total_duration: Duration,
}

impl FilterMetrics {
    pub fn new(plan: &TilingPlan, ops_per_tile: usize) -> Self {
        Self {
            tile_h: plan.tile_h,
            tile_w: plan.tile_w,
            total_tiles: plan.num_tiles(),
            tiles_submitted: 0,
            tiles_per_engine: vec![0; plan.num_engines],
            ops_per_tile,
            memory_bytes: plan.memory_bytes,
            submit_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
        }
    }

    pub fn record_tile(&mut self, engine: usize) {
        self.tiles_submitted += 1;
        if let Some(n) = self.tiles_per_engine.get_mut(engine) {
            *n += 1;
        }
    }

    pub fn finalise(&mut self, submit: Duration, total: Duration) {
        self.submit_duration = submit;
        self.total_duration = total;
    }

    pub fn tiles_per_second(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.tiles_submitted as f64 / secs
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        format!(
            "Denoise: {}/{} tiles of {}x{} ({} ops each), per engine {:?}, \
             {:.2}ms submit, {:.2}ms total ({:.1} tiles/s), memory {:.2} MB",
            self.tiles_submitted,
            self.total_tiles,
            self.tile_w,
            self.tile_h,
            self.ops_per_tile,
            self.tiles_per_engine,
            self.submit_duration.as_secs_f64() * 1000.0,
            self.total_duration.as_secs_f64() * 1000.0,
            self.tiles_per_second(),
            self.memory_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}
