// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, TensorLayout};

/// Errors that can occur when creating, viewing or reordering tensors.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the descriptor.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A tensor view would extend past the end of its buffer.
    #[error("tensor view [{offset}, {offset}+{size}) exceeds buffer of {buffer_size} bytes")]
    ViewOutOfRange {
        offset: usize,
        size: usize,
        buffer_size: usize,
    },

    /// The dimensions do not match the rank the layout requires.
    #[error("layout {layout} expects rank {expected}, got dims of rank {actual}")]
    RankMismatch {
        layout: TensorLayout,
        expected: usize,
        actual: usize,
    },

    /// A padded dimension is smaller than its logical dimension, or does not
    /// respect the layout's channel blocking.
    #[error("invalid padded dims {padded:?} for dims {dims:?} in layout {layout}")]
    InvalidPadding {
        dims: Vec<usize>,
        padded: Vec<usize>,
        layout: TensorLayout,
    },

    /// No reorder exists between the given layout/type combination.
    #[error("unsupported {what} reorder: {src_layout}/{src_dtype} -> {dst_layout}/{dst_dtype}")]
    UnsupportedReorder {
        what: &'static str,
        src_layout: TensorLayout,
        src_dtype: DType,
        dst_layout: TensorLayout,
        dst_dtype: DType,
    },

    /// A channel range passed to a reorder does not fit the tensor.
    #[error("reorder range out of bounds: {detail}")]
    ReorderRange { detail: String },
}
