// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The host reference engine.
//!
//! Each [`HostEngine`] owns a worker thread that runs submitted ops in order.
//! Ops are simulated: they validate their bindings and log an
//! [`ExecRecord`], which makes the engine useful for planning, tests and
//! dry runs on machines without an accelerator.

mod ops;
mod queue;

pub use ops::ExecRecord;

use crate::{
    ConcatConvDesc, ConvDesc, DeviceConfig, Engine, InputProcessDesc, Op, OpError, OpKind, OutputProcessDesc,
    PoolDesc, PostOp, UpsampleDesc,
};
use ops::{HostOp, Trace};
use queue::WorkQueue;
use std::sync::{Arc, Mutex};
use tensor_core::TensorDesc;

/// Capabilities of a simulated engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HostEngineConfig {
    /// Whether convolutions can run with a fused pool or upsample.
    pub fused_post_ops: bool,
    /// Ops touching a tensor larger than this report themselves unsupported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tensor_bytes: Option<usize>,
    /// Private scratch every convolution requests.
    pub conv_scratch_bytes: usize,
    pub device: DeviceConfig,
}

impl Default for HostEngineConfig {
    fn default() -> Self {
        Self {
            fused_post_ops: true,
            max_tensor_bytes: None,
            conv_scratch_bytes: 0,
            device: DeviceConfig::default(),
        }
    }
}

pub struct HostEngine {
    id: usize,
    config: HostEngineConfig,
    queue: Arc<WorkQueue>,
    trace: Trace,
}

impl HostEngine {
    /// Starts the engine's worker thread.
    pub fn new(id: usize, config: HostEngineConfig) -> Result<Self, OpError> {
        Ok(Self {
            id,
            config,
            queue: Arc::new(WorkQueue::spawn(id)?),
            trace: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &HostEngineConfig {
        &self.config
    }

    /// Ops executed so far. Call [`Engine::wait`] first for a complete view.
    pub fn trace(&self) -> Vec<ExecRecord> {
        self.trace.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn clear_trace(&self) {
        self.trace.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn fits(&self, descs: &[&TensorDesc]) -> bool {
        self.config
            .max_tensor_bytes
            .map_or(true, |max| descs.iter().all(|d| d.byte_size() <= max))
    }

    fn op(
        &self,
        kind: OpKind,
        srcs: Vec<TensorDesc>,
        dst: Option<TensorDesc>,
        num_weights: usize,
        supported: bool,
    ) -> Box<dyn Op> {
        let all: Vec<&TensorDesc> = srcs.iter().chain(dst.as_ref()).collect();
        let supported = supported && self.fits(&all);
        let scratch = if num_weights > 0 { self.config.conv_scratch_bytes } else { 0 };
        Box::new(HostOp::new(
            kind,
            self.id,
            srcs,
            dst,
            num_weights,
            supported,
            scratch,
            self.queue.clone(),
            self.trace.clone(),
        ))
    }
}

impl Engine for HostEngine {
    fn id(&self) -> usize {
        self.id
    }

    fn device(&self) -> &DeviceConfig {
        &self.config.device
    }

    fn new_input_process(&self, desc: InputProcessDesc) -> Result<Box<dyn Op>, OpError> {
        let dst = desc.dst_desc(&self.config.device)?;
        Ok(self.op(OpKind::InputProcess, Vec::new(), Some(dst), 0, true))
    }

    fn new_output_process(&self, desc: OutputProcessDesc) -> Result<Box<dyn Op>, OpError> {
        Ok(self.op(OpKind::OutputProcess, vec![desc.src], None, 0, true))
    }

    fn new_conv(&self, desc: ConvDesc) -> Result<Box<dyn Op>, OpError> {
        let dst = desc.dst_desc()?;
        let supported = self.is_conv_supported(desc.post_op);
        Ok(self.op(OpKind::Conv, vec![desc.src], Some(dst), 1, supported))
    }

    fn new_concat_conv(&self, desc: ConcatConvDesc) -> Result<Box<dyn Op>, OpError> {
        let dst = desc.dst_desc()?;
        // Interleaved sources cannot be read as one tensor, so the weight is split.
        let num_weights = if desc.src1.layout().is_channel_major() { 1 } else { 2 };
        Ok(self.op(OpKind::ConcatConv, vec![desc.src1, desc.src2], Some(dst), num_weights, true))
    }

    fn new_pool(&self, desc: PoolDesc) -> Result<Box<dyn Op>, OpError> {
        let dst = desc.dst_desc()?;
        Ok(self.op(OpKind::Pool, vec![desc.src], Some(dst), 0, true))
    }

    fn new_upsample(&self, desc: UpsampleDesc) -> Result<Box<dyn Op>, OpError> {
        let dst = desc.dst_desc()?;
        Ok(self.op(OpKind::Upsample, vec![desc.src], Some(dst), 0, true))
    }

    fn is_conv_supported(&self, post_op: PostOp) -> bool {
        post_op == PostOp::None || self.config.fused_post_ops
    }

    fn wait(&self) -> Result<(), OpError> {
        self.queue.wait()
    }
}
