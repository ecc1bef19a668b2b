// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The tiling plan: output of [`crate::search`].

use crate::TileIter;
use tensor_core::ceil_div;

/// Tile size and grid for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TilingPlan {
    pub height: usize,
    pub width: usize,
    /// Tile buffer size, including overlap.
    pub tile_h: usize,
    pub tile_w: usize,
    /// Tiles per axis.
    pub count_h: usize,
    pub count_w: usize,
    pub overlap: usize,
    pub alignment: usize,
    pub num_engines: usize,
    /// Estimated memory of all engine graphs, as reported by the builder.
    pub memory_bytes: usize,
    /// The budget could not be met and the model was built without it.
    pub unconstrained: bool,
    /// Number of model builds the search attempted.
    pub attempts: usize,
}

impl TilingPlan {
    /// A plan for a given tile size, with the final grid computed from it.
    pub fn fixed(
        height: usize,
        width: usize,
        tile_h: usize,
        tile_w: usize,
        overlap: usize,
        alignment: usize,
        num_engines: usize,
    ) -> Self {
        Self {
            height,
            width,
            tile_h,
            tile_w,
            count_h: grid_count(height, tile_h, overlap),
            count_w: grid_count(width, tile_w, overlap),
            overlap,
            alignment,
            num_engines,
            memory_bytes: 0,
            unconstrained: false,
            attempts: 0,
        }
    }

    pub fn num_tiles(&self) -> usize {
        self.count_h * self.count_w
    }

    /// Iterates tile geometry in row-major order.
    pub fn regions(&self) -> TileIter {
        TileIter::new(*self)
    }

    /// Returns a human-readable summary of the plan.
    pub fn summary(&self) -> String {
        format!(
            "Tiling {}x{}: {} tiles of {}x{} ({}x{} grid, overlap {}), {} engines, est. {:.2} MB{}",
            self.width,
            self.height,
            self.num_tiles(),
            self.tile_w,
            self.tile_h,
            self.count_w,
            self.count_h,
            self.overlap,
            self.num_engines,
            self.memory_bytes as f64 / (1024.0 * 1024.0),
            if self.unconstrained { " (over budget)" } else { "" },
        )
    }
}

/// Tiles needed along one axis with stride `tile - 2 * overlap`.
pub fn grid_count(extent: usize, tile: usize, overlap: usize) -> usize {
    if extent > tile {
        ceil_div(extent - 2 * overlap, tile - 2 * overlap)
    } else {
        1
    }
}
