// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory layout tags and the element addressing they imply.
//!
//! Activations are rank 3 (`C, H, W`), convolution weights rank 4
//! (`O, I, H, W`) and biases rank 1 (`X`). Blocked layouts interleave a
//! block of channels innermost so that devices can load one block per
//! vector instruction; their padded channel dimensions must be multiples of
//! the block size.
//!
//! ```text
//! Chw8c         [C/8][H][W][8c]
//! OIhw8i8o      [O/8][I/8][H][W][8i][8o]
//! OIhw2o8i8o2i  [O/16][I/16][H][W][2o][8i][8o][2i]
//! OIhw8i16o2i   [O/16][I/16][H][W][8i][16o][2i]
//! ```

use std::fmt;

/// How the elements of a tensor are arranged in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TensorLayout {
    /// Rank 1, dense.
    #[serde(rename = "x")]
    X,
    /// Rank 3, planar channels.
    #[serde(rename = "chw")]
    Chw,
    /// Rank 3, channels blocked by 8.
    #[serde(rename = "Chw8c")]
    Chw8c,
    /// Rank 3, channels blocked by 16.
    #[serde(rename = "Chw16c")]
    Chw16c,
    /// Rank 3, interleaved channels.
    #[serde(rename = "hwc")]
    Hwc,
    /// Rank 4, dense (the layout weights are stored in on disk).
    #[serde(rename = "oihw")]
    Oihw,
    /// Rank 4, 8×8 channel blocks.
    #[serde(rename = "OIhw8i8o")]
    OIhw8i8o,
    /// Rank 4, 16×16 channel blocks.
    #[serde(rename = "OIhw16i16o")]
    OIhw16i16o,
    /// Rank 4, 16×16 blocks arranged for systolic matrix engines.
    #[serde(rename = "OIhw2o8i8o2i")]
    OIhw2o8i8o2i,
    /// Rank 4, 16×16 blocks with input pairs innermost.
    #[serde(rename = "OIhw8i16o2i")]
    OIhw8i16o2i,
    /// Rank 4, input channels innermost.
    #[serde(rename = "ohwi")]
    Ohwi,
}

impl TensorLayout {
    /// Number of dimensions a tensor in this layout has.
    pub fn rank(self) -> usize {
        match self {
            TensorLayout::X => 1,
            TensorLayout::Chw | TensorLayout::Chw8c | TensorLayout::Chw16c | TensorLayout::Hwc => 3,
            TensorLayout::Oihw
            | TensorLayout::OIhw8i8o
            | TensorLayout::OIhw16i16o
            | TensorLayout::OIhw2o8i8o2i
            | TensorLayout::OIhw8i16o2i
            | TensorLayout::Ohwi => 4,
        }
    }

    /// Channel block size (1 for unblocked layouts).
    pub fn block_size(self) -> usize {
        match self {
            TensorLayout::Chw8c | TensorLayout::OIhw8i8o => 8,
            TensorLayout::Chw16c
            | TensorLayout::OIhw16i16o
            | TensorLayout::OIhw2o8i8o2i
            | TensorLayout::OIhw8i16o2i => 16,
            _ => 1,
        }
    }

    /// Returns `true` for activation layouts that keep each channel plane
    /// (or channel block) contiguous, so that two tensors placed back to back
    /// form one tensor with the channels concatenated.
    pub fn is_channel_major(self) -> bool {
        matches!(self, TensorLayout::Chw | TensorLayout::Chw8c | TensorLayout::Chw16c)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TensorLayout::X => "x",
            TensorLayout::Chw => "chw",
            TensorLayout::Chw8c => "Chw8c",
            TensorLayout::Chw16c => "Chw16c",
            TensorLayout::Hwc => "hwc",
            TensorLayout::Oihw => "oihw",
            TensorLayout::OIhw8i8o => "OIhw8i8o",
            TensorLayout::OIhw16i16o => "OIhw16i16o",
            TensorLayout::OIhw2o8i8o2i => "OIhw2o8i8o2i",
            TensorLayout::OIhw8i16o2i => "OIhw8i16o2i",
            TensorLayout::Ohwi => "ohwi",
        }
    }

    /// Computes the element index of `index` within a tensor whose padded
    /// dims are `padded`. Both slices must have this layout's rank.
    pub(crate) fn element_offset(self, padded: &[usize], index: &[usize]) -> usize {
        debug_assert_eq!(padded.len(), self.rank());
        debug_assert_eq!(index.len(), self.rank());

        match self {
            TensorLayout::X => index[0],

            TensorLayout::Chw => {
                let (h_dim, w_dim) = (padded[1], padded[2]);
                let (c, h, w) = (index[0], index[1], index[2]);
                (c * h_dim + h) * w_dim + w
            }
            TensorLayout::Chw8c | TensorLayout::Chw16c => {
                let b = self.block_size();
                let (h_dim, w_dim) = (padded[1], padded[2]);
                let (c, h, w) = (index[0], index[1], index[2]);
                (((c / b) * h_dim + h) * w_dim + w) * b + c % b
            }
            TensorLayout::Hwc => {
                let (c_dim, w_dim) = (padded[0], padded[2]);
                let (c, h, w) = (index[0], index[1], index[2]);
                (h * w_dim + w) * c_dim + c
            }

            TensorLayout::Oihw => {
                let (i_dim, h_dim, w_dim) = (padded[1], padded[2], padded[3]);
                let (o, i, h, w) = (index[0], index[1], index[2], index[3]);
                ((o * i_dim + i) * h_dim + h) * w_dim + w
            }
            TensorLayout::Ohwi => {
                let (i_dim, h_dim, w_dim) = (padded[1], padded[2], padded[3]);
                let (o, i, h, w) = (index[0], index[1], index[2], index[3]);
                ((o * h_dim + h) * w_dim + w) * i_dim + i
            }
            TensorLayout::OIhw8i8o
            | TensorLayout::OIhw16i16o
            | TensorLayout::OIhw2o8i8o2i
            | TensorLayout::OIhw8i16o2i => {
                let b = self.block_size();
                let (i_dim, h_dim, w_dim) = (padded[1], padded[2], padded[3]);
                let (o, i, h, w) = (index[0], index[1], index[2], index[3]);
                let block = (((o / b) * (i_dim / b) + i / b) * h_dim + h) * w_dim + w;
                let (ob, ib) = (o % b, i % b);
                let inner = match self {
                    TensorLayout::OIhw2o8i8o2i => (((ob / 8) * 8 + ib / 2) * 8 + ob % 8) * 2 + ib % 2,
                    TensorLayout::OIhw8i16o2i => ((ib / 2) * 16 + ob) * 2 + ib % 2,
                    _ => ib * b + ob,
                };
                block * b * b + inner
            }
        }
    }
}

impl fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Every layout must map the padded index space onto `0..n` bijectively.
    fn assert_bijective(layout: TensorLayout, padded: &[usize]) {
        let n: usize = padded.iter().product();
        let mut seen = HashSet::with_capacity(n);
        let mut index = vec![0usize; padded.len()];
        loop {
            let off = layout.element_offset(padded, &index);
            assert!(off < n, "{layout}: offset {off} out of range for {index:?}");
            assert!(seen.insert(off), "{layout}: duplicate offset {off} for {index:?}");

            // Odometer increment.
            let mut d = padded.len();
            loop {
                if d == 0 {
                    assert_eq!(seen.len(), n);
                    return;
                }
                d -= 1;
                index[d] += 1;
                if index[d] < padded[d] {
                    break;
                }
                index[d] = 0;
            }
        }
    }

    #[test]
    fn test_activation_layouts_are_bijective() {
        assert_bijective(TensorLayout::Chw, &[3, 4, 5]);
        assert_bijective(TensorLayout::Chw8c, &[16, 3, 2]);
        assert_bijective(TensorLayout::Chw16c, &[32, 2, 3]);
        assert_bijective(TensorLayout::Hwc, &[5, 3, 4]);
    }

    #[test]
    fn test_weight_layouts_are_bijective() {
        assert_bijective(TensorLayout::Oihw, &[4, 3, 3, 3]);
        assert_bijective(TensorLayout::Ohwi, &[4, 3, 3, 3]);
        assert_bijective(TensorLayout::OIhw8i8o, &[16, 8, 3, 3]);
        assert_bijective(TensorLayout::OIhw16i16o, &[16, 32, 1, 2]);
        assert_bijective(TensorLayout::OIhw2o8i8o2i, &[32, 16, 1, 3]);
        assert_bijective(TensorLayout::OIhw8i16o2i, &[16, 32, 2, 1]);
    }

    #[test]
    fn test_blocked_channels_are_innermost() {
        let padded = [16, 2, 2];
        let a = TensorLayout::Chw8c.element_offset(&padded, &[0, 1, 1]);
        let b = TensorLayout::Chw8c.element_offset(&padded, &[1, 1, 1]);
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_rank_and_block() {
        assert_eq!(TensorLayout::X.rank(), 1);
        assert_eq!(TensorLayout::Hwc.rank(), 3);
        assert_eq!(TensorLayout::OIhw8i16o2i.rank(), 4);
        assert_eq!(TensorLayout::Chw16c.block_size(), 16);
        assert_eq!(TensorLayout::Oihw.block_size(), 1);
        assert!(TensorLayout::Chw8c.is_channel_major());
        assert!(!TensorLayout::Hwc.is_channel_major());
    }
}
