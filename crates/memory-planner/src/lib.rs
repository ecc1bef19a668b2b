// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-planner
//!
//! Packs the temporary tensors of a dataflow graph into one scratch buffer.
//!
//! # Key Components
//!
//! - [`MemoryBudget`]: a memory ceiling with human-readable parsing
//!   (`"600M"`, `"1G"`, etc.).
//! - [`AllocationTable`]: an arena of [`TensorAlloc`] records, each with a
//!   closed op-index lifetime and optional contiguity links addressed by
//!   [`AllocId`].
//! - [`AllocationTable::plan`]: greedy best-gap placement of [`Chunk`]s.
//! - [`PlanStats`]: packed versus naive footprint.
//!
//! # Example
//! ```
//! use memory_planner::AllocationTable;
//! use tensor_core::{DType, TensorDesc, TensorDims, TensorLayout};
//!
//! let desc = TensorDesc::dense(TensorDims::chw(16, 8, 8), TensorLayout::Chw, DType::F32).unwrap();
//! let mut table = AllocationTable::new();
//!
//! // op 0 produces a, op 1 consumes a and produces b, op 2 produces c from b.
//! let a = table.push(desc.clone(), 0);
//! table.extend_lifetime(a, 1);
//! let b = table.push(desc.clone(), 1);
//! table.extend_lifetime(b, 2);
//! let c = table.push(desc.clone(), 2);
//!
//! let stats = table.plan();
//! // a is dead when c is produced, so c reuses a's bytes.
//! assert_eq!(table.offset(c), table.offset(a));
//! assert_eq!(stats.packed_bytes, 2 * desc.aligned_byte_size());
//! ```

mod budget;
mod error;
mod planner;
mod stats;

pub use budget::MemoryBudget;
pub use error::PlanError;
pub use planner::{AllocId, AllocationTable, Chunk, TensorAlloc};
pub use stats::PlanStats;
