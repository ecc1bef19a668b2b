// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the denoising filter.

/// Errors that can occur while configuring, planning or running the filter.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to load or save weights.
    #[error("weight loading failed for '{name}': {detail}")]
    WeightLoad { name: String, detail: String },

    /// Building, finalizing or running a graph failed.
    #[error("graph error: {0}")]
    Graph(#[from] op_graph::GraphError),

    /// A filter-owned tensor could not be described or placed.
    #[error("tensor error: {0}")]
    Tensor(#[from] tensor_core::TensorError),

    /// An engine failed outside of a graph.
    #[error("engine error: {0}")]
    Engine(#[from] op_graph::OpError),

    /// No tiling could be found.
    #[error("tiling error: {0}")]
    Tiling(#[from] tiling_planner::TilingError),

    /// The progress callback stopped execution.
    #[error("execution cancelled after {completed_tiles} of {total_tiles} tiles")]
    Cancelled { completed_tiles: usize, total_tiles: usize },

    /// `execute` was called before a successful `init`.
    #[error("filter is not initialized")]
    NotInitialized,
}
