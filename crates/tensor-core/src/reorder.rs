// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Reordering of learned convolution parameters into device layouts.
//!
//! Weights are stored as dense `oihw` tensors. Devices want them padded to
//! their channel block size and often blocked (see [`TensorLayout`]). A
//! reorder copies every in-range element and writes zero into every padding
//! position, so devices can run whole blocks without masking.
//!
//! Concatenated-input convolutions reorder one source weight in two input
//! channel segments, either into two destination tensors or into two
//! channel ranges of one destination tensor.

use crate::{DType, Tensor, TensorError, TensorLayout};

/// Returns `true` if a weight reorder between the combination is implemented.
pub fn is_weight_reorder_supported(
    src_layout: TensorLayout,
    _src_dtype: DType,
    dst_layout: TensorLayout,
    dst_dtype: DType,
) -> bool {
    // Any source precision converts.
    if src_layout != TensorLayout::Oihw {
        return false;
    }
    match dst_layout {
        TensorLayout::Oihw
        | TensorLayout::OIhw8i8o
        | TensorLayout::OIhw16i16o
        | TensorLayout::Ohwi => true,
        // Matrix-engine layouts only exist in half precision.
        TensorLayout::OIhw2o8i8o2i | TensorLayout::OIhw8i16o2i => dst_dtype == DType::F16,
        _ => false,
    }
}

/// Reorders input channels `[src_begin_i, src_begin_i + src_i)` of `src`
/// into input channels `[dst_begin_i, dst_begin_i + dst_i)` of `dst`.
///
/// Destination channels at or beyond `src_i` within the range, and every
/// output channel beyond the source's `O`, are zero-filled. `dst_i` is
/// normally `src_i` rounded up to the block size.
pub fn reorder_weight(
    src: &Tensor,
    src_begin_i: usize,
    src_i: usize,
    dst: &Tensor,
    dst_begin_i: usize,
    dst_i: usize,
) -> Result<(), TensorError> {
    let (sd, dd) = (src.desc(), dst.desc());

    if sd.rank() != 4 || dd.rank() != 4
        || !is_weight_reorder_supported(sd.layout(), sd.dtype(), dd.layout(), dd.dtype())
    {
        return Err(TensorError::UnsupportedReorder {
            what: "weight",
            src_layout: sd.layout(),
            src_dtype: sd.dtype(),
            dst_layout: dd.layout(),
            dst_dtype: dd.dtype(),
        });
    }
    if src_begin_i + src_i > sd.padded_i() || dst_begin_i + dst_i > dd.padded_i() {
        return Err(TensorError::ReorderRange {
            detail: format!(
                "source channels {src_begin_i}+{src_i} of {}, destination channels {dst_begin_i}+{dst_i} of {}",
                sd.padded_i(),
                dd.padded_i()
            ),
        });
    }
    check_distinct(src, dst)?;

    let padded = dd.padded_dims().as_slice();
    let (out_c, kh, kw) = (padded[0], padded[2], padded[3]);
    let src_o = sd.o();
    if sd.h() != kh || sd.w() != kw {
        return Err(TensorError::ReorderRange {
            detail: format!("kernel {}x{} does not match destination {kh}x{kw}", sd.h(), sd.w()),
        });
    }

    let src_map = src.map_read();
    let mut dst_map = dst.map_write();

    for o in 0..out_c {
        for i in 0..dst_i {
            for h in 0..kh {
                for w in 0..kw {
                    let value = if o < src_o && i < src_i {
                        src_map.get(&[o, src_begin_i + i, h, w])
                    } else {
                        0.0
                    };
                    dst_map.set(&[o, dst_begin_i + i, h, w], value);
                }
            }
        }
    }

    Ok(())
}

/// Copies a bias vector and zero-fills the padding up to `dst`'s padded length.
pub fn reorder_bias(src: &Tensor, dst: &Tensor) -> Result<(), TensorError> {
    let (sd, dd) = (src.desc(), dst.desc());
    if sd.layout() != TensorLayout::X || dd.layout() != TensorLayout::X {
        return Err(TensorError::UnsupportedReorder {
            what: "bias",
            src_layout: sd.layout(),
            src_dtype: sd.dtype(),
            dst_layout: dd.layout(),
            dst_dtype: dd.dtype(),
        });
    }
    if sd.x() > dd.padded_x() {
        return Err(TensorError::ReorderRange {
            detail: format!("bias of {} elements does not fit {}", sd.x(), dd.padded_x()),
        });
    }
    check_distinct(src, dst)?;

    let src_map = src.map_read();
    let mut dst_map = dst.map_write();
    for x in 0..dd.padded_x() {
        let value = if x < sd.x() { src_map.get(&[x]) } else { 0.0 };
        dst_map.set(&[x], value);
    }
    Ok(())
}

fn check_distinct(src: &Tensor, dst: &Tensor) -> Result<(), TensorError> {
    if src.buffer().same_memory(dst.buffer()) {
        return Err(TensorError::ReorderRange {
            detail: "source and destination share a buffer".into(),
        });
    }
    Ok(())
}
