// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The tiled denoising filter.
//!
//! [`DenoiseFilter`] owns one U-Net graph per engine. [`DenoiseFilter::init`]
//! searches for a tile size at which every instance fits the memory budget
//! and the tile count divides across engines, leaving the graphs built for
//! it. [`DenoiseFilter::execute`] then walks the tiles row-major, handing
//! tile `i` to engine `i % engines`, and waits for all engines at the end.
//!
//! Engine 0's scratch buffer also holds the filter's global scratch after
//! its graph's region; today that is the temporary output image of in-place
//! tiled filtering.

use crate::model::{build_unet, ALIGNMENT, OUTPUT_CHANNELS, OVERLAP};
use crate::{FilterConfig, FilterMetrics, RuntimeError};
use op_graph::host::HostEngine;
use op_graph::{Engine, Graph, Progress, RunStatus, WeightMap};
use std::sync::Arc;
use std::time::Instant;
use tensor_core::{Tensor, TensorDesc, TensorDims, TensorLayout};
use tiling_planner::{grid_count, search, BuildOutcome, TileBuilder, TilingParams, TilingPlan};
use tracing::{debug, info};

/// Starts `config.num_engines` host engines.
pub fn host_engines(config: &FilterConfig) -> Result<Vec<Arc<HostEngine>>, RuntimeError> {
    (0..config.num_engines)
        .map(|id| Ok(Arc::new(HostEngine::new(id, config.engine.clone())?)))
        .collect()
}

pub struct DenoiseFilter {
    engines: Vec<Arc<dyn Engine>>,
    config: FilterConfig,
    graphs: Vec<Graph>,
    plan: Option<TilingPlan>,
    /// Staging image for in-place tiled output, a view into engine 0's scratch.
    output_temp: Option<Tensor>,
}

impl DenoiseFilter {
    /// Creates a filter with one model instance per engine.
    ///
    /// Nothing is built until [`init`](Self::init).
    pub fn new(
        engines: Vec<Arc<dyn Engine>>,
        weights: Arc<WeightMap>,
        config: FilterConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        if engines.is_empty() {
            return Err(RuntimeError::Config("at least one engine is required".into()));
        }
        let graphs = engines
            .iter()
            .map(|e| Graph::new(e.clone(), weights.clone()))
            .collect();
        Ok(Self {
            engines,
            config,
            graphs,
            plan: None,
            output_temp: None,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn num_engines(&self) -> usize {
        self.engines.len()
    }

    /// The tiling chosen by the last successful [`init`](Self::init).
    pub fn plan(&self) -> Option<&TilingPlan> {
        self.plan.as_ref()
    }

    /// The model instance of one engine.
    pub fn graph(&self, engine: usize) -> Option<&Graph> {
        self.graphs.get(engine)
    }

    /// The temporary output image of the current model, if it needs one.
    pub fn output_temp(&self) -> Option<&Tensor> {
        self.output_temp.as_ref()
    }

    /// Bytes of global scratch the filter reserves for a tile size.
    ///
    /// Only in-place filtering over more than one tile needs any: the
    /// output is staged in a full-size temporary image so that no tile
    /// reads pixels another tile already overwrote.
    pub fn global_scratch_byte_size(&self, tile_h: usize, tile_w: usize) -> Result<usize, RuntimeError> {
        Ok(self
            .output_temp_desc(tile_h, tile_w)?
            .map_or(0, |d| d.aligned_byte_size()))
    }

    fn output_temp_desc(&self, tile_h: usize, tile_w: usize) -> Result<Option<TensorDesc>, RuntimeError> {
        let c = &self.config;
        let tiles = grid_count(c.height, tile_h, OVERLAP) * grid_count(c.width, tile_w, OVERLAP);
        if !c.in_place || tiles <= 1 {
            return Ok(None);
        }
        let dtype = self.engines[0].device().dtype;
        let dims = TensorDims::chw(OUTPUT_CHANNELS, c.height, c.width);
        Ok(Some(TensorDesc::dense(dims, TensorLayout::Hwc, dtype)?))
    }

    /// Tiling parameters derived from the configuration and the devices.
    pub fn tiling_params(&self) -> Result<TilingParams, RuntimeError> {
        let dtype = self.engines[0].device().dtype;
        Ok(TilingParams {
            height: self.config.height,
            width: self.config.width,
            alignment: ALIGNMENT,
            overlap: OVERLAP,
            num_engines: self.engines.len(),
            budget: self.config.resolve_budget(dtype)?,
        })
    }

    /// Changes the image size; the filter must be initialized again.
    pub fn set_image_size(&mut self, width: usize, height: usize) -> Result<(), RuntimeError> {
        let mut config = self.config.clone();
        config.width = width;
        config.height = height;
        config.validate()?;
        self.config = config;
        self.reset_model();
        self.plan = None;
        Ok(())
    }

    /// Finds the tiling and builds every model instance for it.
    pub fn init(&mut self) -> Result<&TilingPlan, RuntimeError> {
        let params = self.tiling_params()?;
        self.reset_model();
        self.plan = None;
        let plan = search(&params, self)?;
        Ok(self.plan.insert(plan))
    }

    /// Builds the network on every engine for one tile size.
    ///
    /// With a `budget`, the estimate for all instances is checked after the
    /// first one is declared; on [`BuildOutcome::OverBudget`] or
    /// [`BuildOutcome::Unsupported`] every graph is cleared.
    pub fn build_model(
        &mut self,
        tile_h: usize,
        tile_w: usize,
        budget: Option<usize>,
    ) -> Result<BuildOutcome, RuntimeError> {
        self.reset_model();
        let result = self.try_build_model(tile_h, tile_w, budget);
        if !matches!(result, Ok(BuildOutcome::Built { .. })) {
            self.reset_model();
        }
        result
    }

    fn try_build_model(
        &mut self,
        tile_h: usize,
        tile_w: usize,
        budget: Option<usize>,
    ) -> Result<BuildOutcome, RuntimeError> {
        let input_channels = self.config.inputs.channels();
        let num_engines = self.engines.len();
        let output_temp_desc = self.output_temp_desc(tile_h, tile_w)?;
        let global_bytes = output_temp_desc.as_ref().map_or(0, |d| d.aligned_byte_size());
        let mut memory_bytes = 0;

        for (id, graph) in self.graphs.iter_mut().enumerate() {
            build_unet(graph, input_channels, tile_h, tile_w)?;
            if !graph.is_supported() {
                debug!(engine = id, tile_h, tile_w, "model not supported at this tile size");
                return Ok(BuildOutcome::Unsupported);
            }

            let graph_scratch_bytes = graph.scratch_byte_size()?;
            let mut scratch_bytes = graph_scratch_bytes;
            if id == 0 {
                // Global scratch follows the graph's region in engine 0's buffer.
                scratch_bytes += global_bytes;
                let instance = graph_scratch_bytes + graph.private_byte_size();
                memory_bytes = scratch_bytes + graph.private_byte_size() + instance * (num_engines - 1);
                if budget.is_some_and(|b| memory_bytes > b) {
                    debug!(tile_h, tile_w, memory_bytes, global_bytes, ?budget, "model over budget");
                    return Ok(BuildOutcome::OverBudget {
                        required_bytes: memory_bytes,
                    });
                }
            }

            let scratch = graph.engine().new_scratch_buffer(scratch_bytes);
            if id == 0 {
                if let Some(desc) = output_temp_desc.clone() {
                    self.output_temp = Some(scratch.tensor(desc, graph_scratch_bytes)?);
                }
            }
            graph.set_scratch(scratch)?;
            graph.finalize()?;
        }

        debug!(tile_h, tile_w, memory_bytes, global_bytes, "model built");
        Ok(BuildOutcome::Built { memory_bytes })
    }

    /// Clears every model instance.
    pub fn reset_model(&mut self) {
        for graph in &mut self.graphs {
            graph.clear();
        }
        self.output_temp = None;
    }

    /// Denoises the image tile by tile.
    ///
    /// Progress counts one unit per op per tile. When the progress callback
    /// cancels, no further ops are submitted; the engines are drained either
    /// way before this returns.
    pub fn execute(&mut self, progress: &mut Progress) -> Result<FilterMetrics, RuntimeError> {
        let plan = self.plan.ok_or(RuntimeError::NotInitialized)?;
        let ops_per_tile = self.graphs[0].work_amount();
        let mut metrics = FilterMetrics::new(&plan, ops_per_tile);
        progress.start(plan.num_tiles() * ops_per_tile);

        let start = Instant::now();
        let mut outcome = Ok(());
        for region in plan.regions() {
            let graph = &mut self.graphs[region.engine];
            graph.set_tile(&region);
            debug!(tile = region.index, engine = region.engine, "submitting tile");
            match graph.run(progress) {
                Ok(RunStatus::Completed) => metrics.record_tile(region.engine),
                Ok(RunStatus::Cancelled) => {
                    outcome = Err(RuntimeError::Cancelled {
                        completed_tiles: metrics.tiles_submitted,
                        total_tiles: plan.num_tiles(),
                    });
                    break;
                }
                Err(e) => {
                    outcome = Err(e.into());
                    break;
                }
            }
        }
        let submitted = start.elapsed();

        // Barrier: every engine is drained even if submission failed.
        for engine in &self.engines {
            let waited = engine.wait().map_err(RuntimeError::from);
            if outcome.is_ok() {
                outcome = waited;
            }
        }
        metrics.finalise(submitted, start.elapsed());
        outcome?;

        info!("{}", metrics.summary());
        Ok(metrics)
    }
}

impl TileBuilder for DenoiseFilter {
    type Error = RuntimeError;

    fn try_build(&mut self, tile_h: usize, tile_w: usize, budget: Option<usize>) -> Result<BuildOutcome, Self::Error> {
        self.build_model(tile_h, tile_w, budget)
    }
}

impl std::fmt::Debug for DenoiseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenoiseFilter")
            .field("engines", &self.engines.len())
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("plan", &self.plan)
            .finish()
    }
}
