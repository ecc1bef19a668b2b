// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tiling inputs.

use crate::TilingError;
use memory_planner::MemoryBudget;

/// Everything the search needs to know about the image, the model and the
/// device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TilingParams {
    pub height: usize,
    pub width: usize,
    /// Tile extents are multiples of this (plus twice the overlap).
    pub alignment: usize,
    /// Pixels of context each tile borrows from its neighbours on each side.
    pub overlap: usize,
    pub num_engines: usize,
    pub budget: MemoryBudget,
}

impl TilingParams {
    /// Smallest tile edge the search will split down to.
    ///
    /// Three overlaps leave at least one overlap of useful output. The
    /// alignment term raises this above `3 * overlap` when the alignment is
    /// coarser than the overlap: every split tile is an aligned size plus two
    /// overlaps, so a smaller floor could never be reached and the search
    /// would not terminate (with a zero overlap it would split forever).
    pub fn min_tile(&self) -> usize {
        (3 * self.overlap).max(self.alignment + 2 * self.overlap)
    }

    pub fn validate(&self) -> Result<(), TilingError> {
        let fail = |m: &str| Err(TilingError::InvalidParams(m.to_string()));
        if self.height == 0 || self.width == 0 {
            return fail("image must not be empty");
        }
        if self.alignment == 0 {
            return fail("alignment must be positive");
        }
        if self.num_engines == 0 {
            return fail("at least one engine is required");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TilingParams {
        TilingParams {
            height: 64,
            width: 64,
            alignment: 16,
            overlap: 8,
            num_engines: 2,
            budget: MemoryBudget::from_mb(600),
        }
    }

    #[test]
    fn test_min_tile() {
        let mut p = params();
        assert_eq!(p.min_tile(), 32);
        p.overlap = 96;
        assert_eq!(p.min_tile(), 288);
        p.overlap = 0;
        assert_eq!(p.min_tile(), 16);
    }

    #[test]
    fn test_validate() {
        assert!(params().validate().is_ok());
        assert!(TilingParams { height: 0, ..params() }.validate().is_err());
        assert!(TilingParams { alignment: 0, ..params() }.validate().is_err());
        assert!(TilingParams { num_engines: 0, ..params() }.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let p = params();
        let json = serde_json::to_string(&p).unwrap();
        let back: TilingParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
