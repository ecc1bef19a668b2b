// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-tile geometry.
//!
//! Tiles are laid out on a grid with stride `tile - 2 * overlap`, so every
//! interior edge is covered by two tiles. Each tile reads its input including
//! the overlap and writes back only the part not owned by a neighbour:
//!
//! ```text
//!   image  ├──────── tile 0 ────────┤
//!                            ├──────── tile 1 ────────┤
//!   output ├──── out 0 ─────┤├──── out 1 ───────────────┤
//!                        overlap │ overlap
//! ```
//!
//! The tile buffer always has the full tile size; a partial last tile is
//! aligned to its bottom/right edge.

use crate::TilingPlan;
use tensor_core::round_up;

/// A rectangular copy between the image and a tile buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TileCopy {
    /// Top-left corner in the full image.
    pub image_y: usize,
    pub image_x: usize,
    /// Top-left corner in the tile buffer.
    pub buffer_y: usize,
    pub buffer_x: usize,
    pub height: usize,
    pub width: usize,
}

/// Geometry of one tile and the engine that processes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TileRegion {
    /// Row-major tile index.
    pub index: usize,
    pub row: usize,
    pub col: usize,
    /// `index % num_engines`.
    pub engine: usize,
    /// Image to tile buffer, including overlap.
    pub input: TileCopy,
    /// Tile buffer to image, excluding overlap shared with neighbours.
    pub output: TileCopy,
}

/// One axis of a tile.
struct Span {
    image: usize,
    buffer: usize,
    size: usize,
    out_image: usize,
    out_buffer: usize,
    out_size: usize,
}

fn span(i: usize, count: usize, extent: usize, tile: usize, overlap: usize, alignment: usize) -> Span {
    let image = i * (tile - 2 * overlap);
    let begin = if i > 0 { overlap } else { 0 };
    let end = if i + 1 < count { overlap } else { 0 };
    let size = (extent - image).min(tile);
    let buffer = tile.saturating_sub(round_up(size, alignment));
    Span {
        image,
        buffer,
        size,
        out_image: image + begin,
        out_buffer: buffer + begin,
        out_size: size - begin - end,
    }
}

/// Iterates the tiles of a plan in row-major order.
#[derive(Debug, Clone)]
pub struct TileIter {
    plan: TilingPlan,
    next: usize,
}

impl TileIter {
    pub(crate) fn new(plan: TilingPlan) -> Self {
        Self { plan, next: 0 }
    }

    fn region(&self, index: usize) -> TileRegion {
        let p = &self.plan;
        let (row, col) = (index / p.count_w, index % p.count_w);
        let ys = span(row, p.count_h, p.height, p.tile_h, p.overlap, p.alignment);
        let xs = span(col, p.count_w, p.width, p.tile_w, p.overlap, p.alignment);
        TileRegion {
            index,
            row,
            col,
            engine: index % p.num_engines,
            input: TileCopy {
                image_y: ys.image,
                image_x: xs.image,
                buffer_y: ys.buffer,
                buffer_x: xs.buffer,
                height: ys.size,
                width: xs.size,
            },
            output: TileCopy {
                image_y: ys.out_image,
                image_x: xs.out_image,
                buffer_y: ys.out_buffer,
                buffer_x: xs.out_buffer,
                height: ys.out_size,
                width: xs.out_size,
            },
        }
    }
}

impl Iterator for TileIter {
    type Item = TileRegion;

    fn next(&mut self) -> Option<TileRegion> {
        if self.next >= self.plan.num_tiles() {
            return None;
        }
        let r = self.region(self.next);
        self.next += 1;
        Some(r)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.plan.num_tiles() - self.next;
        (n, Some(n))
    }
}

impl ExactSizeIterator for TileIter {}
