// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for graph construction and op execution.

use memory_planner::PlanError;
use tensor_core::TensorError;

/// Errors raised by an individual op.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// A tensor or parameter the op needs was never bound.
    #[error("op '{op}' is missing its {what}")]
    Unbound { op: String, what: &'static str },

    /// A bound tensor does not match the op's descriptor.
    #[error("op '{op}': {detail}")]
    InvalidBinding { op: String, detail: String },

    /// The engine's work queue is gone.
    #[error("engine {engine} queue closed")]
    QueueClosed { engine: usize },

    #[error("failed to start engine {engine}: {source}")]
    Spawn {
        engine: usize,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Errors that can occur while building, finalizing or running a graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Ops cannot be declared once the graph is finalized.
    #[error("graph cannot be changed after finalization")]
    Finalized,

    /// The graph must be finalized before it can run.
    #[error("graph is not finalized")]
    NotFinalized,

    /// The handle does not refer to an op of this graph.
    #[error("unknown op handle {0}")]
    UnknownOp(usize),

    /// The op has no destination tensor and cannot feed another op.
    #[error("op '{0}' has no output to consume")]
    NoOutput(String),

    /// Contiguity or lifetime constraints are inconsistent.
    #[error(transparent)]
    InvalidAllocation(#[from] PlanError),

    /// A required weight tensor is not in the weight map.
    #[error("missing weight tensor '{0}'")]
    MissingWeight(String),

    /// A weight tensor has the wrong rank or shape.
    #[error("invalid convolution weight/bias for '{name}': {detail}")]
    InvalidWeight { name: String, detail: String },

    /// The fused post-op cannot be split into separate ops.
    #[error("cannot split fused convolution '{0}'")]
    CannotSplitFusedConv(String),

    #[error("no scratch buffer was set before finalize")]
    ScratchNotSet,

    #[error("scratch buffer of {actual} bytes is smaller than the planned {required} bytes")]
    ScratchTooSmall { required: usize, actual: usize },

    #[error(transparent)]
    Tensor(#[from] TensorError),

    #[error(transparent)]
    Op(#[from] OpError),
}
