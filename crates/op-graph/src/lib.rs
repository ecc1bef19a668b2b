// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # op-graph
//!
//! Builds ordered graphs of neural-network ops that share one planned
//! scratch buffer.
//!
//! Ops come from an [`Engine`], a single in-order execution queue on some
//! device. A [`Graph`] records which op produces and consumes which
//! intermediate tensor, plans all of them into one scratch buffer with the
//! memory planner, reorders convolution weights into the device layout and
//! binds everything at [`Graph::finalize`]. The [`host`] module provides a
//! reference engine that runs simulated ops on a worker thread.
//!
//! ## Example
//!
//! ```
//! use op_graph::host::{HostEngine, HostEngineConfig};
//! use op_graph::{Engine, Graph, Progress, RunStatus, WeightMap};
//! use std::sync::Arc;
//! use tensor_core::TensorDims;
//! use tiling_planner::TilingPlan;
//!
//! let engine = Arc::new(HostEngine::new(0, HostEngineConfig::default()).unwrap());
//! let mut graph = Graph::new(engine.clone(), Arc::new(WeightMap::new()));
//!
//! let input = graph.add_input_process("input", TensorDims::chw(3, 64, 64), 16).unwrap();
//! let pool = graph.add_pool("pool", input).unwrap();
//! let up = graph.add_upsample("up", pool).unwrap();
//! graph.add_output_process("output", up).unwrap();
//!
//! let scratch = engine_scratch(&mut graph);
//! graph.set_scratch(scratch).unwrap();
//! graph.finalize().unwrap();
//!
//! let tile = TilingPlan::fixed(64, 64, 64, 64, 0, 16, 1).regions().next().unwrap();
//! graph.set_tile(&tile);
//! assert_eq!(graph.run(&mut Progress::new()).unwrap(), RunStatus::Completed);
//!
//! fn engine_scratch(graph: &mut Graph) -> tensor_core::Buffer {
//!     let size = graph.scratch_byte_size().unwrap();
//!     graph.engine().new_scratch_buffer(size)
//! }
//! ```

pub mod engine;
pub mod error;
pub mod graph;
pub mod host;
pub mod op;
pub mod progress;
pub mod weights;

pub use engine::{DeviceConfig, Engine};
pub use error::{GraphError, OpError};
pub use graph::{Graph, OpHandle, PlannedTensor, RunStatus};
pub use op::{
    Activation, ConcatConvDesc, ConvDesc, ConvParams, InputProcessDesc, Op, OpKind, OutputProcessDesc, PoolDesc,
    PostOp, UpsampleDesc,
};
pub use progress::Progress;
pub use weights::WeightMap;
