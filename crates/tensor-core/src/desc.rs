// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor descriptors.

use crate::{round_up, DType, TensorDims, TensorError, TensorLayout};
use std::fmt;

/// Byte alignment of every tensor placed in device memory.
pub const MEMORY_ALIGNMENT: usize = 128;

/// Immutable description of a tensor: logical dims, padded dims, layout and
/// element type.
///
/// Padded dims are what the memory footprint is computed from; the region
/// between the logical and padded extents holds zeros.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TensorDesc {
    dims: TensorDims,
    padded_dims: TensorDims,
    layout: TensorLayout,
    dtype: DType,
}

impl TensorDesc {
    /// Creates a descriptor, checking rank and padding against the layout.
    pub fn new(
        dims: TensorDims,
        padded_dims: TensorDims,
        layout: TensorLayout,
        dtype: DType,
    ) -> Result<Self, TensorError> {
        let rank = layout.rank();
        if dims.rank() != rank || padded_dims.rank() != rank {
            return Err(TensorError::RankMismatch {
                layout,
                expected: rank,
                actual: dims.rank().max(padded_dims.rank()),
            });
        }

        let too_small = dims
            .as_slice()
            .iter()
            .zip(padded_dims.as_slice())
            .any(|(d, p)| p < d);

        // Blocked layouts block the channel dims: C for activations, O and I for weights.
        let b = layout.block_size();
        let misaligned = b > 1
            && match rank {
                3 => padded_dims.as_slice()[0] % b != 0,
                4 => padded_dims.as_slice()[0] % b != 0 || padded_dims.as_slice()[1] % b != 0,
                _ => false,
            };

        if too_small || misaligned {
            return Err(TensorError::InvalidPadding {
                dims: dims.as_slice().to_vec(),
                padded: padded_dims.as_slice().to_vec(),
                layout,
            });
        }

        Ok(Self {
            dims,
            padded_dims,
            layout,
            dtype,
        })
    }

    /// Creates an unpadded descriptor.
    pub fn dense(dims: TensorDims, layout: TensorLayout, dtype: DType) -> Result<Self, TensorError> {
        Self::new(dims.clone(), dims, layout, dtype)
    }

    pub fn dims(&self) -> &TensorDims {
        &self.dims
    }

    pub fn padded_dims(&self) -> &TensorDims {
        &self.padded_dims
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.dims.rank()
    }

    /// Number of elements including padding.
    pub fn num_elements(&self) -> usize {
        self.padded_dims.num_elements()
    }

    /// Size of the padded tensor in bytes.
    pub fn byte_size(&self) -> usize {
        self.num_elements() * self.dtype.size_bytes()
    }

    /// Size in bytes rounded up to [`MEMORY_ALIGNMENT`].
    pub fn aligned_byte_size(&self) -> usize {
        round_up(self.byte_size(), MEMORY_ALIGNMENT)
    }

    fn dim(&self, rank: usize, index: usize) -> usize {
        debug_assert_eq!(self.rank(), rank, "accessor used on a rank {} tensor", self.rank());
        self.dims.as_slice()[index]
    }

    fn padded_dim(&self, rank: usize, index: usize) -> usize {
        debug_assert_eq!(self.rank(), rank, "accessor used on a rank {} tensor", self.rank());
        self.padded_dims.as_slice()[index]
    }

    // Rank 1.
    pub fn x(&self) -> usize {
        self.dim(1, 0)
    }
    pub fn padded_x(&self) -> usize {
        self.padded_dim(1, 0)
    }

    // Rank 3.
    pub fn c(&self) -> usize {
        self.dim(3, 0)
    }
    pub fn padded_c(&self) -> usize {
        self.padded_dim(3, 0)
    }
    pub fn h(&self) -> usize {
        self.dims.as_slice()[self.rank() - 2]
    }
    pub fn w(&self) -> usize {
        self.dims.as_slice()[self.rank() - 1]
    }

    // Rank 4.
    pub fn o(&self) -> usize {
        self.dim(4, 0)
    }
    pub fn padded_o(&self) -> usize {
        self.padded_dim(4, 0)
    }
    pub fn i(&self) -> usize {
        self.dim(4, 1)
    }
    pub fn padded_i(&self) -> usize {
        self.padded_dim(4, 1)
    }
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (padded {}) {} {}",
            self.dims, self.padded_dims, self.layout, self.dtype
        )
    }
}
