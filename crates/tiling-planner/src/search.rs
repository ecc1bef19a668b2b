// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The tile size search.
//!
//! The search is purely algorithmic: it never builds anything itself but
//! asks a [`TileBuilder`] whether the model can be built for a candidate tile
//! size under the budget. Starting with the whole image as one tile, it
//! splits the longer axis (width on ties) until the tile count divides evenly
//! across engines and the builder succeeds. When neither axis can be split
//! any further it makes one last attempt without a budget.

use crate::plan::grid_count;
use crate::{TilingError, TilingParams, TilingPlan};
use tensor_core::{ceil_div, round_up};
use tracing::{debug, info, warn};

/// Result of one model build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The model was built and is ready to run.
    Built { memory_bytes: usize },
    /// Some op cannot run at this tile size; the model was discarded.
    Unsupported,
    /// The estimate exceeds the budget; the model was discarded.
    OverBudget { required_bytes: usize },
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, BuildOutcome::Built { .. })
    }
}

/// Builds the model for a tile size on behalf of the search.
///
/// Implementations must leave the model built after returning
/// [`BuildOutcome::Built`] and discard it otherwise. Errors are fatal and
/// abort the search.
pub trait TileBuilder {
    type Error: std::error::Error + Send + Sync + 'static;

    /// `budget` is `None` for the final unconstrained attempt.
    fn try_build(
        &mut self,
        tile_h: usize,
        tile_w: usize,
        budget: Option<usize>,
    ) -> Result<BuildOutcome, Self::Error>;
}

/// Finds a tile size whose count divides across engines and whose model
/// fits the budget, leaving the builder's model built for it.
pub fn search<B: TileBuilder>(params: &TilingParams, builder: &mut B) -> Result<TilingPlan, TilingError> {
    params.validate()?;

    let TilingParams {
        height,
        width,
        alignment,
        overlap,
        num_engines,
        budget,
    } = *params;
    let min_tile = params.min_tile();
    let split = |extent: usize, count: usize| {
        (round_up(ceil_div(extent.saturating_sub(2 * overlap), count), alignment) + 2 * overlap).max(min_tile)
    };

    let mut count_h = 1;
    let mut count_w = 1;
    let mut tile_h = round_up(height, alignment);
    let mut tile_w = round_up(width, alignment);
    let mut attempts = 0;
    let mut unconstrained = false;

    let mut try_tile = |tile_h: usize, tile_w: usize, budget: Option<usize>, attempts: &mut usize| {
        *attempts += 1;
        let outcome = builder
            .try_build(tile_h, tile_w, budget)
            .map_err(|e| TilingError::Build(Box::new(e)))?;
        debug!(tile_h, tile_w, ?budget, ?outcome, "model build attempt");
        Ok::<_, TilingError>(outcome)
    };

    let memory_bytes = loop {
        // The split counters can overshoot the tiles the geometry actually
        // needs, so divisibility is checked on the real grid.
        let tiles = grid_count(height, tile_h, overlap) * grid_count(width, tile_w, overlap);
        if tiles % num_engines == 0 {
            if let BuildOutcome::Built { memory_bytes } =
                try_tile(tile_h, tile_w, Some(budget.as_bytes()), &mut attempts)?
            {
                break memory_bytes;
            }
        }

        if tile_h > min_tile && tile_h > tile_w {
            count_h += 1;
            tile_h = split(height, count_h);
        } else if tile_w > min_tile {
            count_w += 1;
            tile_w = split(width, count_w);
        } else {
            warn!(tile_h, tile_w, %budget, "cannot split tiles further, building without a memory budget");
            match try_tile(tile_h, tile_w, None, &mut attempts)? {
                BuildOutcome::Built { memory_bytes } => {
                    unconstrained = true;
                    break memory_bytes;
                }
                _ => return Err(TilingError::NoFeasibleTiling { tile_h, tile_w }),
            }
        }
    };

    let plan = TilingPlan {
        height,
        width,
        tile_h,
        tile_w,
        count_h: grid_count(height, tile_h, overlap),
        count_w: grid_count(width, tile_w, overlap),
        overlap,
        alignment,
        num_engines,
        memory_bytes,
        unconstrained,
        attempts,
    };
    info!("{}", plan.summary());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_planner::MemoryBudget;

    /// Memory grows with tile area; records every attempt.
    struct AreaBuilder {
        bytes_per_pixel: usize,
        max_supported_side: usize,
        calls: Vec<(usize, usize, Option<usize>)>,
    }

    impl AreaBuilder {
        fn new(bytes_per_pixel: usize) -> Self {
            Self {
                bytes_per_pixel,
                max_supported_side: usize::MAX,
                calls: Vec::new(),
            }
        }
    }

    impl TileBuilder for AreaBuilder {
        type Error = std::io::Error;

        fn try_build(&mut self, tile_h: usize, tile_w: usize, budget: Option<usize>) -> Result<BuildOutcome, Self::Error> {
            self.calls.push((tile_h, tile_w, budget));
            if tile_h.max(tile_w) > self.max_supported_side {
                return Ok(BuildOutcome::Unsupported);
            }
            let required = tile_h * tile_w * self.bytes_per_pixel;
            match budget {
                Some(b) if required > b => Ok(BuildOutcome::OverBudget { required_bytes: required }),
                _ => Ok(BuildOutcome::Built { memory_bytes: required }),
            }
        }
    }

    struct FailingBuilder;

    impl TileBuilder for FailingBuilder {
        type Error = std::io::Error;

        fn try_build(&mut self, _: usize, _: usize, _: Option<usize>) -> Result<BuildOutcome, Self::Error> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "device lost"))
        }
    }

    fn params(height: usize, width: usize, num_engines: usize, budget: usize) -> TilingParams {
        TilingParams {
            height,
            width,
            alignment: 16,
            overlap: 8,
            num_engines,
            budget: MemoryBudget::from_bytes(budget),
        }
    }

    #[test]
    fn test_ample_budget_one_engine_single_tile() {
        let mut b = AreaBuilder::new(1);
        let plan = search(&params(100, 70, 1, usize::MAX), &mut b).unwrap();
        assert_eq!(plan.num_tiles(), 1);
        assert_eq!((plan.tile_h, plan.tile_w), (112, 80));
        assert_eq!(plan.attempts, 1);
        assert!(!plan.unconstrained);
    }

    #[test]
    fn test_two_engines_force_width_split_on_tie() {
        let mut b = AreaBuilder::new(1);
        let plan = search(&params(64, 64, 2, usize::MAX), &mut b).unwrap();
        assert_eq!((plan.tile_h, plan.tile_w), (64, 48));
        assert_eq!((plan.count_h, plan.count_w), (1, 2));
        assert_eq!(plan.num_tiles() % 2, 0);
        // The single-tile geometry is never built: its count does not divide.
        assert_eq!(b.calls, vec![(64, 48, Some(usize::MAX))]);
    }

    #[test]
    fn test_divisibility_uses_real_tile_count() {
        // 116 pixels with overlap 8: split counters 4, 5 and 6 all give
        // 48-pixel tiles, which need only four tiles.
        let mut b = AreaBuilder::new(1);
        let plan = search(&params(16, 116, 4, usize::MAX), &mut b).unwrap();
        assert!(!plan.unconstrained);
        assert_eq!((plan.tile_w, plan.num_tiles()), (48, 4));

        // Five engines never get a budgeted build at 48: no split of this
        // image yields five tiles, so only the final attempt remains.
        let mut b = AreaBuilder::new(1);
        let plan = search(&params(16, 116, 5, usize::MAX), &mut b).unwrap();
        assert!(plan.unconstrained);
        assert_eq!(b.calls, vec![(16, 32, None)]);
    }

    #[test]
    fn test_budget_splits_longer_axis_first() {
        let mut b = AreaBuilder::new(1);
        // 256x128 does not fit in 20000 bytes; the height is split first.
        let plan = search(&params(256, 128, 1, 20_000), &mut b).unwrap();
        assert!(plan.tile_h * plan.tile_w <= 20_000);
        assert_eq!(b.calls[0], (256, 128, Some(20_000)));
        assert_eq!(b.calls[1].1, 128);
        assert!(b.calls[1].0 < 256);
    }

    #[test]
    fn test_tiny_budget_falls_back_once() {
        let mut b = AreaBuilder::new(1);
        let plan = search(&params(200, 200, 1, 1), &mut b).unwrap();
        assert!(plan.unconstrained);
        let min = params(200, 200, 1, 1).min_tile();
        assert_eq!((plan.tile_h, plan.tile_w), (min, min));
        assert_eq!(b.calls.iter().filter(|c| c.2.is_none()).count(), 1);
        assert_eq!(b.calls.last().unwrap().2, None);
    }

    #[test]
    fn test_unsupported_everywhere_is_an_error() {
        let mut b = AreaBuilder::new(1);
        b.max_supported_side = 0;
        let r = search(&params(100, 100, 1, usize::MAX), &mut b);
        assert!(matches!(r, Err(TilingError::NoFeasibleTiling { .. })));
    }

    #[test]
    fn test_unsupported_large_tiles_are_split() {
        let mut b = AreaBuilder::new(1);
        b.max_supported_side = 100;
        let plan = search(&params(300, 300, 1, usize::MAX), &mut b).unwrap();
        assert!(plan.tile_h <= 100 && plan.tile_w <= 100);
        assert!(!plan.unconstrained);
    }

    #[test]
    fn test_builder_errors_propagate() {
        let r = search(&params(64, 64, 1, usize::MAX), &mut FailingBuilder);
        assert!(matches!(r, Err(TilingError::Build(_))));
    }

    #[test]
    fn test_invalid_params() {
        let r = search(&params(0, 64, 1, 100), &mut AreaBuilder::new(1));
        assert!(matches!(r, Err(TilingError::InvalidParams(_))));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(128))]

            #[test]
            fn prop_search_terminates_and_covers(
                height in 1usize..2000,
                width in 1usize..2000,
                alignment in prop::sample::select(vec![1usize, 8, 16, 32]),
                overlap in 0usize..64,
                num_engines in 1usize..5,
                budget in 1usize..4_000_000,
            ) {
                let p = TilingParams {
                    height,
                    width,
                    alignment,
                    overlap,
                    num_engines,
                    budget: MemoryBudget::from_bytes(budget),
                };
                let mut b = AreaBuilder::new(4);
                let plan = search(&p, &mut b).unwrap();

                prop_assert_eq!(b.calls.iter().filter(|c| c.2.is_none()).count(), usize::from(plan.unconstrained));
                if !plan.unconstrained {
                    prop_assert!(plan.memory_bytes <= budget);
                    prop_assert_eq!(plan.num_tiles() % num_engines, 0);
                }

                // Output spans tile each axis exactly.
                let mut next_y = 0;
                let mut next_x = 0;
                for r in plan.regions() {
                    if r.col == 0 {
                        prop_assert_eq!(r.output.image_y, next_y);
                        next_y += r.output.height;
                        next_x = 0;
                    }
                    prop_assert_eq!(r.output.image_x, next_x);
                    next_x += r.output.width;
                    if r.col + 1 == plan.count_w {
                        prop_assert_eq!(next_x, width);
                    }
                    prop_assert!(r.input.buffer_y + r.input.height <= plan.tile_h);
                    prop_assert!(r.input.buffer_x + r.input.width <= plan.tile_w);
                    prop_assert_eq!(r.engine, r.index % num_engines);
                }
                prop_assert_eq!(next_y, height);
            }
        }
    }
}
