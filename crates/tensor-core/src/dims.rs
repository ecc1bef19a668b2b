// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor dimension lists and integer rounding helpers.

use std::fmt;

/// Rounds `value` up to the next multiple of `multiple`.
///
/// ```
/// use tensor_core::round_up;
/// assert_eq!(round_up(17, 16), 32);
/// assert_eq!(round_up(32, 16), 32);
/// assert_eq!(round_up(0, 8), 0);
/// ```
pub fn round_up(value: usize, multiple: usize) -> usize {
    debug_assert!(multiple > 0);
    value.div_ceil(multiple) * multiple
}

/// Integer division rounding towards positive infinity.
pub fn ceil_div(value: usize, divisor: usize) -> usize {
    debug_assert!(divisor > 0);
    value.div_ceil(divisor)
}

/// The extents of a tensor, outermost first.
///
/// Interpretation depends on the rank: `[X]`, `[C, H, W]` or `[O, I, H, W]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TensorDims(Vec<usize>);

impl TensorDims {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    /// Creates a rank 1 dim list.
    pub fn x(x: usize) -> Self {
        Self(vec![x])
    }

    /// Creates a rank 3 activation dim list.
    pub fn chw(c: usize, h: usize, w: usize) -> Self {
        Self(vec![c, h, w])
    }

    /// Creates a rank 4 weight dim list.
    pub fn oihw(o: usize, i: usize, h: usize, w: usize) -> Self {
        Self(vec![o, i, h, w])
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Total number of elements (1 for rank 0).
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<usize> {
        self.0.get(index).copied()
    }
}

impl fmt::Display for TensorDims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<usize>> for TensorDims {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for TensorDims {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_up(1, 8), 8);
        assert_eq!(round_up(9, 8), 16);
        assert_eq!(ceil_div(48, 32), 2);
        assert_eq!(ceil_div(64, 32), 2);
        assert_eq!(ceil_div(0, 5), 0);
    }

    #[test]
    fn test_constructors() {
        assert_eq!(TensorDims::x(5).rank(), 1);
        assert_eq!(TensorDims::chw(3, 4, 5).num_elements(), 60);
        assert_eq!(TensorDims::oihw(2, 3, 3, 3).get(1), Some(3));
        assert_eq!(TensorDims::oihw(2, 3, 3, 3).get(4), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", TensorDims::chw(3, 64, 32)), "[3, 64, 32]");
    }

    #[test]
    fn test_from_conversions() {
        let a: TensorDims = vec![2, 3].into();
        let b: TensorDims = (&[2, 3][..]).into();
        assert_eq!(a, b);
    }
}
