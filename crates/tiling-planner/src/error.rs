// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the tiling planner.

/// Errors that can occur during the tiling search.
#[derive(Debug, thiserror::Error)]
pub enum TilingError {
    /// The parameters cannot describe a tiling.
    #[error("invalid tiling parameters: {0}")]
    InvalidParams(String),

    /// No tile size could be split further and the model could not be built
    /// even without a memory budget.
    #[error("could not build the model for any tiling (smallest tile {tile_h}x{tile_w})")]
    NoFeasibleTiling { tile_h: usize, tile_w: usize },

    /// The model builder failed for a reason other than support or memory.
    #[error("model build failed: {0}")]
    Build(#[source] Box<dyn std::error::Error + Send + Sync>),
}
