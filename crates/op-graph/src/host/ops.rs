// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Simulated ops of the host engine.
//!
//! A host op validates every binding against its descriptors, then on submit
//! enqueues a job that clears its destination and records what ran. No
//! arithmetic is performed.

use super::queue::WorkQueue;
use crate::{ConvParams, Op, OpError, OpKind};
use std::sync::{Arc, Mutex};
use tensor_core::{Buffer, Tensor, TensorDesc};
use tiling_planner::TileRegion;

/// One executed op, in execution order per engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExecRecord {
    pub engine: usize,
    pub op: String,
    pub kind: OpKind,
    /// The tile the op was configured for, if any.
    pub tile: Option<usize>,
}

pub(crate) type Trace = Arc<Mutex<Vec<ExecRecord>>>;

pub(crate) struct HostOp {
    pub(crate) kind: OpKind,
    pub(crate) name: String,
    pub(crate) engine: usize,
    pub(crate) src_descs: Vec<TensorDesc>,
    pub(crate) dst_desc: Option<TensorDesc>,
    /// Number of reordered weight tensors expected, zero for non-convolutions.
    pub(crate) num_weights: usize,
    pub(crate) supported: bool,
    pub(crate) scratch_bytes: usize,
    pub(crate) queue: Arc<WorkQueue>,
    pub(crate) trace: Trace,
    srcs: Vec<Tensor>,
    dst: Option<Tensor>,
    params: Option<ConvParams>,
    scratch: Option<Buffer>,
    tile: Option<TileRegion>,
}

impl HostOp {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        kind: OpKind,
        engine: usize,
        src_descs: Vec<TensorDesc>,
        dst_desc: Option<TensorDesc>,
        num_weights: usize,
        supported: bool,
        scratch_bytes: usize,
        queue: Arc<WorkQueue>,
        trace: Trace,
    ) -> Self {
        Self {
            kind,
            name: kind.as_str().to_string(),
            engine,
            src_descs,
            dst_desc,
            num_weights,
            supported,
            scratch_bytes,
            queue,
            trace,
            srcs: Vec::new(),
            dst: None,
            params: None,
            scratch: None,
            tile: None,
        }
    }

    fn invalid(&self, detail: String) -> OpError {
        OpError::InvalidBinding {
            op: self.name.clone(),
            detail,
        }
    }

    fn unbound(&self, what: &'static str) -> OpError {
        OpError::Unbound {
            op: self.name.clone(),
            what,
        }
    }

    /// Checks that the tile's copy fits the tensor it touches.
    fn check_tile(&self) -> Result<Option<usize>, OpError> {
        let (copy, tensor) = match self.kind {
            OpKind::InputProcess => (self.tile.map(|t| t.input), self.dst.as_ref()),
            OpKind::OutputProcess => (self.tile.map(|t| t.output), self.srcs.first()),
            _ => return Ok(self.tile.map(|t| t.index)),
        };
        let copy = copy.ok_or_else(|| self.unbound("tile"))?;
        let tensor = tensor.ok_or_else(|| self.unbound("tensors"))?;
        let d = tensor.desc();
        if copy.buffer_y + copy.height > d.h() || copy.buffer_x + copy.width > d.w() {
            return Err(self.invalid(format!(
                "tile copy {}x{} at ({}, {}) exceeds the {}x{} tensor",
                copy.width,
                copy.height,
                copy.buffer_x,
                copy.buffer_y,
                d.w(),
                d.h()
            )));
        }
        Ok(self.tile.map(|t| t.index))
    }
}

impl Op for HostOp {
    fn kind(&self) -> OpKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn dst_desc(&self) -> Option<TensorDesc> {
        self.dst_desc.clone()
    }

    fn is_supported(&self) -> bool {
        self.supported
    }

    fn scratch_byte_size(&self) -> usize {
        self.scratch_bytes
    }

    fn bind_src(&mut self, srcs: Vec<Tensor>) -> Result<(), OpError> {
        if srcs.len() != self.src_descs.len() {
            return Err(self.invalid(format!("expected {} sources, got {}", self.src_descs.len(), srcs.len())));
        }
        for (n, (t, expected)) in srcs.iter().zip(&self.src_descs).enumerate() {
            if t.desc() != expected {
                return Err(self.invalid(format!("source {n} descriptor mismatch")));
            }
        }
        self.srcs = srcs;
        Ok(())
    }

    fn bind_dst(&mut self, dst: Tensor) -> Result<(), OpError> {
        if self.dst_desc.as_ref() != Some(dst.desc()) {
            return Err(self.invalid("destination descriptor mismatch".into()));
        }
        self.dst = Some(dst);
        Ok(())
    }

    fn bind_params(&mut self, params: ConvParams) -> Result<(), OpError> {
        if self.num_weights == 0 {
            return Err(self.invalid(format!("{} ops take no parameters", self.kind)));
        }
        if params.weights.len() != self.num_weights {
            return Err(self.invalid(format!(
                "expected {} weight tensors, got {}",
                self.num_weights,
                params.weights.len()
            )));
        }
        self.params = Some(params);
        Ok(())
    }

    fn bind_scratch(&mut self, scratch: Buffer) {
        self.scratch = Some(scratch);
    }

    fn set_tile(&mut self, tile: &TileRegion) {
        self.tile = Some(*tile);
    }

    fn finalize(&mut self) -> Result<(), OpError> {
        if self.srcs.len() != self.src_descs.len() {
            return Err(self.unbound("sources"));
        }
        if self.dst_desc.is_some() && self.dst.is_none() {
            return Err(self.unbound("destination"));
        }
        if self.num_weights > 0 && self.params.is_none() {
            return Err(self.unbound("parameters"));
        }
        if self.scratch_bytes > 0 && self.scratch.as_ref().map_or(true, |s| s.size() < self.scratch_bytes) {
            return Err(self.unbound("scratch"));
        }
        Ok(())
    }

    fn submit(&mut self) -> Result<(), OpError> {
        let tile = self.check_tile()?;
        let record = ExecRecord {
            engine: self.engine,
            op: self.name.clone(),
            kind: self.kind,
            tile,
        };
        let dst = self.dst.clone();
        let trace = self.trace.clone();
        self.queue.submit(move || {
            if let Some(dst) = dst {
                dst.map_write().fill_zero();
            }
            trace.lock().unwrap_or_else(|e| e.into_inner()).push(record);
        })
    }
}
