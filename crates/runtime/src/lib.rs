// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! The tiled U-Net denoising filter.
//!
//! The runtime takes:
//! - A [`FilterConfig`] (image size, input features, engine count, budget).
//! - A [`op_graph::WeightMap`] from the [`WeightLoader`].
//! - One [`op_graph::Engine`] per device queue.
//!
//! And splits the image into overlapping tiles so that one model instance
//! per engine fits the memory budget, then runs the tiles round-robin over
//! the engines.
//!
//! ```text
//! DenoiseFilter::new ──► init (tiling search + build) ──► execute (per tile) ──► metrics
//! ```

mod config;
mod error;
mod filter;
mod metrics;
pub mod model;
mod weight_loader;

pub use config::{FilterConfig, InputFeatures, DEFAULT_BUDGET_MB_PER_ELEMENT_BYTE};
pub use error::RuntimeError;
pub use filter::{host_engines, DenoiseFilter};
pub use metrics::FilterMetrics;
pub use weight_loader::{save_safetensors, synthetic_weights, WeightLoader};
