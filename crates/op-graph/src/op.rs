// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The op capability interface and the descriptors ops are created from.
//!
//! An op is created by an [`crate::Engine`] from a descriptor, declared into
//! a [`crate::Graph`], and bound to concrete tensors only when the graph is
//! finalized. Descriptors compute the destination descriptor themselves, so
//! the graph can plan memory before any op exists on a device.

use crate::{DeviceConfig, OpError};
use std::fmt;
use tensor_core::{round_up, Buffer, Tensor, TensorDesc, TensorDims, TensorError};
use tiling_planner::TileRegion;

/// Activation applied after a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    None,
    #[default]
    ReLU,
}

/// Operation fused after a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostOp {
    #[default]
    None,
    /// 2x2 max pooling.
    Pool,
    /// 2x nearest-neighbour upsampling.
    Upsample,
}

/// The kind of an op, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    InputProcess,
    OutputProcess,
    Conv,
    ConcatConv,
    Pool,
    Upsample,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::InputProcess => "input_process",
            OpKind::OutputProcess => "output_process",
            OpKind::Conv => "conv",
            OpKind::ConcatConv => "concat_conv",
            OpKind::Pool => "pool",
            OpKind::Upsample => "upsample",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Descriptors ────────────────────────────────────────────────────

/// Converts an image tile into the network's input tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProcessDesc {
    /// Logical input dims `[C, H, W]`, H and W being the tile size.
    pub src_dims: TensorDims,
    pub alignment: usize,
}

impl InputProcessDesc {
    pub fn dst_desc(&self, device: &DeviceConfig) -> Result<TensorDesc, TensorError> {
        let d = self.src_dims.as_slice();
        let (c, h, w) = (d[0], round_up(d[1], self.alignment), round_up(d[2], self.alignment));
        TensorDesc::new(
            TensorDims::chw(c, h, w),
            TensorDims::chw(round_up(c, device.block_c), h, w),
            device.tensor_layout,
            device.dtype,
        )
    }
}

/// Converts the network's output tensor back into an image tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputProcessDesc {
    pub src: TensorDesc,
}

/// A 3x3 convolution with bias, activation and an optional fused post-op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvDesc {
    pub src: TensorDesc,
    /// Final (padded, device-layout) weight descriptor.
    pub weight: TensorDesc,
    pub bias: TensorDesc,
    pub activation: Activation,
    pub post_op: PostOp,
}

impl ConvDesc {
    pub fn dst_desc(&self) -> Result<TensorDesc, TensorError> {
        let (h, w) = match self.post_op {
            PostOp::None => (self.src.h(), self.src.w()),
            PostOp::Pool => (self.src.h() / 2, self.src.w() / 2),
            PostOp::Upsample => (self.src.h() * 2, self.src.w() * 2),
        };
        conv_dst(&self.src, &self.weight, h, w)
    }
}

/// A convolution over the channel concatenation of two sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatConvDesc {
    pub src1: TensorDesc,
    pub src2: TensorDesc,
    /// Final weight descriptor with `I = padded C1 + padded C2`.
    pub weight: TensorDesc,
    pub bias: TensorDesc,
    pub activation: Activation,
}

impl ConcatConvDesc {
    pub fn dst_desc(&self) -> Result<TensorDesc, TensorError> {
        conv_dst(&self.src1, &self.weight, self.src1.h(), self.src1.w())
    }

    /// Weight applied to the first source when the weight is split in two.
    pub fn weight1_desc(&self) -> Result<TensorDesc, TensorError> {
        self.weight_part(self.src1.c(), self.src1.padded_c())
    }

    /// Weight applied to the second source when the weight is split in two.
    pub fn weight2_desc(&self) -> Result<TensorDesc, TensorError> {
        self.weight_part(self.src2.c(), self.src2.padded_c())
    }

    fn weight_part(&self, c: usize, padded_c: usize) -> Result<TensorDesc, TensorError> {
        let w = &self.weight;
        TensorDesc::new(
            TensorDims::oihw(w.o(), c, w.h(), w.w()),
            TensorDims::oihw(w.padded_o(), padded_c, w.h(), w.w()),
            w.layout(),
            w.dtype(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolDesc {
    pub src: TensorDesc,
}

impl PoolDesc {
    pub fn dst_desc(&self) -> Result<TensorDesc, TensorError> {
        resize(&self.src, self.src.h() / 2, self.src.w() / 2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsampleDesc {
    pub src: TensorDesc,
}

impl UpsampleDesc {
    pub fn dst_desc(&self) -> Result<TensorDesc, TensorError> {
        resize(&self.src, self.src.h() * 2, self.src.w() * 2)
    }
}

fn conv_dst(src: &TensorDesc, weight: &TensorDesc, h: usize, w: usize) -> Result<TensorDesc, TensorError> {
    TensorDesc::new(
        TensorDims::chw(weight.o(), h, w),
        TensorDims::chw(weight.padded_o(), h, w),
        src.layout(),
        src.dtype(),
    )
}

fn resize(src: &TensorDesc, h: usize, w: usize) -> Result<TensorDesc, TensorError> {
    TensorDesc::new(
        TensorDims::chw(src.c(), h, w),
        TensorDims::chw(src.padded_c(), h, w),
        src.layout(),
        src.dtype(),
    )
}

// ── Op trait ───────────────────────────────────────────────────────

/// Reordered convolution parameters.
///
/// `weights` holds one tensor, or two for a concatenated-input convolution
/// whose weight is split per source.
#[derive(Debug, Clone)]
pub struct ConvParams {
    pub weights: Vec<Tensor>,
    pub bias: Tensor,
}

/// The capability interface the graph needs from an op.
///
/// Binding methods are called once, by [`crate::Graph::finalize`], in
/// declaration order; `finalize` is called after all bindings. `submit`
/// enqueues the op on its engine and must not block on its completion.
pub trait Op: Send {
    fn kind(&self) -> OpKind;

    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    /// The destination descriptor, `None` if the op writes outside the graph.
    fn dst_desc(&self) -> Option<TensorDesc>;

    /// Whether the engine can run this op with its current descriptors.
    fn is_supported(&self) -> bool {
        true
    }

    /// Private scratch the op needs while running.
    fn scratch_byte_size(&self) -> usize {
        0
    }

    fn bind_src(&mut self, srcs: Vec<Tensor>) -> Result<(), OpError>;

    fn bind_dst(&mut self, dst: Tensor) -> Result<(), OpError>;

    fn bind_params(&mut self, params: ConvParams) -> Result<(), OpError> {
        let _ = params;
        Err(OpError::InvalidBinding {
            op: self.name().to_string(),
            detail: format!("{} ops take no parameters", self.kind()),
        })
    }

    fn bind_scratch(&mut self, scratch: Buffer) {
        let _ = scratch;
    }

    /// Updates the region of the image the next submission works on.
    fn set_tile(&mut self, tile: &TileRegion) {
        let _ = tile;
    }

    fn finalize(&mut self) -> Result<(), OpError> {
        Ok(())
    }

    fn submit(&mut self) -> Result<(), OpError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::{DType, TensorLayout};

    fn device() -> DeviceConfig {
        DeviceConfig {
            block_c: 16,
            tensor_layout: TensorLayout::Chw16c,
            weight_layout: TensorLayout::OIhw16i16o,
            dtype: DType::F16,
        }
    }

    fn activation(c: usize, h: usize, w: usize) -> TensorDesc {
        TensorDesc::new(
            TensorDims::chw(c, h, w),
            TensorDims::chw(round_up(c, 16), h, w),
            TensorLayout::Chw16c,
            DType::F16,
        )
        .unwrap()
    }

    fn weight(o: usize, i: usize, padded_i: usize) -> TensorDesc {
        TensorDesc::new(
            TensorDims::oihw(o, i, 3, 3),
            TensorDims::oihw(round_up(o, 16), padded_i, 3, 3),
            TensorLayout::OIhw16i16o,
            DType::F16,
        )
        .unwrap()
    }

    fn bias(x: usize) -> TensorDesc {
        TensorDesc::new(TensorDims::x(x), TensorDims::x(round_up(x, 16)), TensorLayout::X, DType::F16).unwrap()
    }

    #[test]
    fn test_input_process_dst() {
        let desc = InputProcessDesc {
            src_dims: TensorDims::chw(9, 100, 70),
            alignment: 16,
        };
        let dst = desc.dst_desc(&device()).unwrap();
        assert_eq!(dst.dims(), &TensorDims::chw(9, 112, 80));
        assert_eq!(dst.padded_c(), 16);
        assert_eq!(dst.layout(), TensorLayout::Chw16c);
    }

    #[test]
    fn test_conv_dst_with_post_ops() {
        let mut desc = ConvDesc {
            src: activation(32, 64, 48),
            weight: weight(48, 32, 32),
            bias: bias(48),
            activation: Activation::ReLU,
            post_op: PostOp::None,
        };
        assert_eq!(desc.dst_desc().unwrap().dims(), &TensorDims::chw(48, 64, 48));
        desc.post_op = PostOp::Pool;
        assert_eq!(desc.dst_desc().unwrap().dims(), &TensorDims::chw(48, 32, 24));
        desc.post_op = PostOp::Upsample;
        assert_eq!(desc.dst_desc().unwrap().dims(), &TensorDims::chw(48, 128, 96));
    }

    #[test]
    fn test_concat_conv_split_weights() {
        // 64 + 9 input channels, padded 64 + 16.
        let desc = ConcatConvDesc {
            src1: activation(64, 32, 32),
            src2: activation(9, 32, 32),
            weight: weight(64, 73, 80),
            bias: bias(64),
            activation: Activation::ReLU,
        };
        let w1 = desc.weight1_desc().unwrap();
        let w2 = desc.weight2_desc().unwrap();
        assert_eq!((w1.i(), w1.padded_i()), (64, 64));
        assert_eq!((w2.i(), w2.padded_i()), (9, 16));
        assert_eq!(desc.dst_desc().unwrap().dims(), &TensorDims::chw(64, 32, 32));
    }

    #[test]
    fn test_pool_and_upsample_dst() {
        let src = activation(32, 64, 64);
        assert_eq!(PoolDesc { src: src.clone() }.dst_desc().unwrap().dims(), &TensorDims::chw(32, 32, 32));
        assert_eq!(UpsampleDesc { src }.dst_desc().unwrap().dims(), &TensorDims::chw(32, 128, 128));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Activation::ReLU).unwrap(), "\"relu\"");
        assert_eq!(serde_json::to_string(&PostOp::Upsample).unwrap(), "\"upsample\"");
        assert_eq!(serde_json::to_string(&OpKind::ConcatConv).unwrap(), "\"concat_conv\"");
    }
}
