// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tiling-planner
//!
//! Chooses how to split an image into overlapping tiles so that one model
//! instance per engine fits a memory budget and the tiles divide evenly
//! across engines.
//!
//! # Trait-Based Probing
//!
//! The search never builds a model itself. The caller implements
//! [`TileBuilder`], which is asked to build the model for a candidate tile
//! size and reports [`BuildOutcome::Built`], [`BuildOutcome::Unsupported`]
//! or [`BuildOutcome::OverBudget`]:
//!
//! ```
//! use memory_planner::MemoryBudget;
//! use tiling_planner::{search, BuildOutcome, TileBuilder, TilingParams};
//!
//! struct Area;
//! impl TileBuilder for Area {
//!     type Error = std::convert::Infallible;
//!     fn try_build(&mut self, h: usize, w: usize, budget: Option<usize>)
//!         -> Result<BuildOutcome, Self::Error> {
//!         let bytes = h * w * 4;
//!         Ok(match budget {
//!             Some(b) if bytes > b => BuildOutcome::OverBudget { required_bytes: bytes },
//!             _ => BuildOutcome::Built { memory_bytes: bytes },
//!         })
//!     }
//! }
//!
//! let params = TilingParams {
//!     height: 1080,
//!     width: 1920,
//!     alignment: 16,
//!     overlap: 96,
//!     num_engines: 2,
//!     budget: MemoryBudget::from_mb(2),
//! };
//! let plan = search(&params, &mut Area).unwrap();
//! assert_eq!(plan.num_tiles() % 2, 0);
//! for tile in plan.regions() {
//!     assert_eq!(tile.engine, tile.index % 2);
//! }
//! ```

mod error;
mod params;
mod plan;
mod region;
mod search;

pub use error::TilingError;
pub use params::TilingParams;
pub use plan::{grid_count, TilingPlan};
pub use region::{TileCopy, TileIter, TileRegion};
pub use search::{search, BuildOutcome, TileBuilder};
