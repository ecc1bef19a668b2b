// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The engine abstraction: one in-order execution queue on a device.

use crate::{
    ConcatConvDesc, ConvDesc, InputProcessDesc, Op, OpError, OutputProcessDesc, PoolDesc, PostOp, UpsampleDesc,
};
use tensor_core::{Buffer, DType, Tensor, TensorDesc, TensorLayout};

/// What the device expects of the tensors it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeviceConfig {
    /// Channel block size; channel dims are padded to a multiple of it.
    pub block_c: usize,
    /// Layout of activation tensors.
    pub tensor_layout: TensorLayout,
    /// Layout convolution weights are reordered into.
    pub weight_layout: TensorLayout,
    pub dtype: DType,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            block_c: 16,
            tensor_layout: TensorLayout::Chw16c,
            weight_layout: TensorLayout::OIhw16i16o,
            dtype: DType::F16,
        }
    }
}

/// An execution queue that creates ops and memory for one device engine.
///
/// Ops created by an engine submit to that engine's queue. Submission order
/// is execution order.
pub trait Engine: Send + Sync {
    fn id(&self) -> usize;

    fn device(&self) -> &DeviceConfig;

    fn new_input_process(&self, desc: InputProcessDesc) -> Result<Box<dyn Op>, OpError>;

    fn new_output_process(&self, desc: OutputProcessDesc) -> Result<Box<dyn Op>, OpError>;

    fn new_conv(&self, desc: ConvDesc) -> Result<Box<dyn Op>, OpError>;

    fn new_concat_conv(&self, desc: ConcatConvDesc) -> Result<Box<dyn Op>, OpError>;

    fn new_pool(&self, desc: PoolDesc) -> Result<Box<dyn Op>, OpError>;

    fn new_upsample(&self, desc: UpsampleDesc) -> Result<Box<dyn Op>, OpError>;

    /// Whether a convolution with the fused `post_op` can run as one op.
    fn is_conv_supported(&self, post_op: PostOp) -> bool;

    /// Allocates a standalone tensor (used for reordered weights).
    fn new_tensor(&self, desc: TensorDesc) -> Tensor {
        Tensor::zeros(desc)
    }

    fn new_scratch_buffer(&self, byte_size: usize) -> Buffer {
        Buffer::new(byte_size)
    }

    /// Blocks until all submitted work has completed.
    fn wait(&self) -> Result<(), OpError>;
}
