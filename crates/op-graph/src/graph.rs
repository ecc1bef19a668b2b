// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The dataflow graph builder.
//!
//! A [`Graph`] is built in two phases. During construction, ops are declared
//! in execution order and every destination tensor becomes an allocation
//! record in an [`AllocationTable`]; nothing is bound yet. [`Graph::finalize`]
//! plans the records into one scratch buffer, creates the tensor views,
//! replays the deferred bindings (sources, destinations, reordered
//! convolution parameters) and finalizes every op. After that the graph is
//! immutable and can be [`run`](Graph::run) once per tile.
//!
//! ```text
//!   declare ops ──► plan ──► set_scratch ──► finalize ──► (set_tile ──► run)*
//!        ▲                                                      │
//!        └───────────────────────── clear ◄─────────────────────┘
//! ```

use crate::{
    Activation, ConcatConvDesc, ConvDesc, ConvParams, Engine, GraphError, InputProcessDesc, Op, OpKind,
    OutputProcessDesc, PoolDesc, PostOp, Progress, UpsampleDesc, WeightMap,
};
use memory_planner::{AllocId, AllocationTable, PlanStats};
use std::sync::Arc;
use tensor_core::{
    reorder_bias, reorder_weight, round_up, Buffer, Tensor, TensorDesc, TensorDims, TensorLayout, MEMORY_ALIGNMENT,
};
use tiling_planner::TileRegion;
use tracing::{debug, info};

/// Refers to an op declared in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpHandle(usize);

impl OpHandle {
    /// Position of the op in execution order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// How a call to [`Graph::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    /// The progress callback asked to stop; later ops were not submitted.
    Cancelled,
}

/// Where a planned tensor lives, for diagnostics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlannedTensor {
    /// Name of the op producing the tensor.
    pub producer: String,
    pub desc: TensorDesc,
    /// Offset in the scratch buffer, after the op scratch area.
    pub byte_offset: usize,
    pub byte_size: usize,
    pub first_op: usize,
    pub last_op: usize,
}

/// One input-channel segment of a weight reorder.
#[derive(Debug, Clone, Copy)]
struct WeightSegment {
    /// Index into the destination weight tensors.
    target: usize,
    src_begin_i: usize,
    src_i: usize,
    dst_begin_i: usize,
    dst_i: usize,
}

/// Convolution parameters still in their stored layout.
#[derive(Debug)]
struct PendingParams {
    weight: Tensor,
    bias: Tensor,
    weight_descs: Vec<TensorDesc>,
    segments: Vec<WeightSegment>,
    bias_desc: TensorDesc,
}

impl PendingParams {
    fn reorder(&self, engine: &dyn Engine) -> Result<ConvParams, GraphError> {
        let weights: Vec<Tensor> = self.weight_descs.iter().map(|d| engine.new_tensor(d.clone())).collect();
        for s in &self.segments {
            reorder_weight(&self.weight, s.src_begin_i, s.src_i, &weights[s.target], s.dst_begin_i, s.dst_i)?;
        }
        let bias = engine.new_tensor(self.bias_desc.clone());
        reorder_bias(&self.bias, &bias)?;
        Ok(ConvParams { weights, bias })
    }
}

/// A binding deferred until scratch offsets are known.
#[derive(Debug)]
enum PendingBind {
    Src { op: usize, srcs: Vec<AllocId> },
    Dst { op: usize, dst: AllocId },
    Params { op: usize, params: PendingParams },
}

/// An ordered list of ops on one engine sharing one scratch buffer.
pub struct Graph {
    engine: Arc<dyn Engine>,
    weights: Arc<WeightMap>,
    ops: Vec<Box<dyn Op>>,
    /// Destination record of each op.
    outputs: Vec<Option<AllocId>>,
    allocs: AllocationTable,
    pending: Vec<PendingBind>,
    scratch: Option<Buffer>,
    op_scratch_byte_size: usize,
    tensor_scratch_byte_size: usize,
    private_byte_size: usize,
    stats: PlanStats,
    /// Set when ops were declared since the last plan.
    dirty: bool,
    finalized: bool,
}

impl Graph {
    pub fn new(engine: Arc<dyn Engine>, weights: Arc<WeightMap>) -> Self {
        Self {
            engine,
            weights,
            ops: Vec::new(),
            outputs: Vec::new(),
            allocs: AllocationTable::new(),
            pending: Vec::new(),
            scratch: None,
            op_scratch_byte_size: 0,
            tensor_scratch_byte_size: 0,
            private_byte_size: 0,
            stats: PlanStats::default(),
            dirty: false,
            finalized: false,
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    // ── Declaration ────────────────────────────────────────────────

    /// Declares the op converting an image tile into a `[C, H, W]` tensor.
    pub fn add_input_process(
        &mut self,
        name: &str,
        src_dims: TensorDims,
        alignment: usize,
    ) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        let op = self.engine.new_input_process(InputProcessDesc { src_dims, alignment })?;
        self.add_op(name, op, &[], false)
    }

    /// Declares the op writing `src` back into the output image.
    pub fn add_output_process(&mut self, name: &str, src: OpHandle) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        let (src_id, src_desc) = self.output_of(src)?;
        let op = self.engine.new_output_process(OutputProcessDesc { src: src_desc })?;
        self.add_op(name, op, &[src_id], false)
    }

    /// Declares a convolution using the weights `<name>.weight` and `<name>.bias`.
    ///
    /// When the engine cannot fuse `post_op`, the convolution is declared
    /// alone and followed by a separate `<name>_pool` or `<name>_upsample`
    /// op; the returned handle then refers to that last op.
    pub fn add_conv(
        &mut self,
        name: &str,
        src: OpHandle,
        activation: Activation,
        post_op: PostOp,
    ) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        if !self.engine.is_conv_supported(post_op) {
            if post_op == PostOp::None {
                return Err(GraphError::CannotSplitFusedConv(name.to_string()));
            }
            let conv = self.add_conv(name, src, activation, PostOp::None)?;
            debug!(op = name, ?post_op, "splitting fused convolution");
            return match post_op {
                PostOp::Pool => self.add_pool(&format!("{name}_pool"), conv),
                PostOp::Upsample => self.add_upsample(&format!("{name}_upsample"), conv),
                PostOp::None => Err(GraphError::CannotSplitFusedConv(name.to_string())),
            };
        }

        let (weight, bias) = self.conv_weights(name)?;
        let (src_id, src_desc) = self.output_of(src)?;
        if weight.desc().i() != src_desc.c() {
            return Err(invalid_weight(
                name,
                format!("weight expects {} input channels, source has {}", weight.desc().i(), src_desc.c()),
            ));
        }

        let weight_desc = self.device_weight_desc(weight.desc(), src_desc.padded_c())?;
        let bias_desc = self.device_bias_desc(bias.desc())?;
        let op = self.engine.new_conv(ConvDesc {
            src: src_desc.clone(),
            weight: weight_desc.clone(),
            bias: bias_desc.clone(),
            activation,
            post_op,
        })?;
        let handle = self.add_op(name, op, &[src_id], false)?;

        self.private_byte_size += weight_desc.byte_size() + bias_desc.byte_size();
        self.pending.push(PendingBind::Params {
            op: handle.0,
            params: PendingParams {
                segments: vec![WeightSegment {
                    target: 0,
                    src_begin_i: 0,
                    src_i: src_desc.c(),
                    dst_begin_i: 0,
                    dst_i: src_desc.padded_c(),
                }],
                weight,
                bias,
                weight_descs: vec![weight_desc],
                bias_desc,
            },
        });
        Ok(handle)
    }

    /// Declares a convolution over the channel concatenation of two sources.
    ///
    /// On channel-major layouts the two sources are placed back to back in
    /// scratch and read as one tensor with one weight. On interleaved layouts
    /// they stay independent and the weight is split per source.
    pub fn add_concat_conv(
        &mut self,
        name: &str,
        src1: OpHandle,
        src2: OpHandle,
        activation: Activation,
    ) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        let (weight, bias) = self.conv_weights(name)?;
        let (id1, d1) = self.output_of(src1)?;
        let (id2, d2) = self.output_of(src2)?;
        if weight.desc().i() != d1.c() + d2.c() {
            return Err(invalid_weight(
                name,
                format!(
                    "weight expects {} input channels, sources have {} + {}",
                    weight.desc().i(),
                    d1.c(),
                    d2.c()
                ),
            ));
        }

        let weight_desc = self.device_weight_desc(weight.desc(), d1.padded_c() + d2.padded_c())?;
        let bias_desc = self.device_bias_desc(bias.desc())?;
        let desc = ConcatConvDesc {
            src1: d1.clone(),
            src2: d2.clone(),
            weight: weight_desc.clone(),
            bias: bias_desc.clone(),
            activation,
        };
        let contiguous = self.engine.device().tensor_layout.is_channel_major();
        let (weight_descs, segments) = if contiguous {
            let segments = vec![
                WeightSegment {
                    target: 0,
                    src_begin_i: 0,
                    src_i: d1.c(),
                    dst_begin_i: 0,
                    dst_i: d1.padded_c(),
                },
                WeightSegment {
                    target: 0,
                    src_begin_i: d1.c(),
                    src_i: d2.c(),
                    dst_begin_i: d1.padded_c(),
                    dst_i: d2.padded_c(),
                },
            ];
            (vec![weight_desc], segments)
        } else {
            let segments = vec![
                WeightSegment {
                    target: 0,
                    src_begin_i: 0,
                    src_i: d1.c(),
                    dst_begin_i: 0,
                    dst_i: d1.padded_c(),
                },
                WeightSegment {
                    target: 1,
                    src_begin_i: d1.c(),
                    src_i: d2.c(),
                    dst_begin_i: 0,
                    dst_i: d2.padded_c(),
                },
            ];
            (vec![desc.weight1_desc()?, desc.weight2_desc()?], segments)
        };

        let op = self.engine.new_concat_conv(desc)?;
        let handle = self.add_op(name, op, &[id1, id2], contiguous)?;

        self.private_byte_size += weight_descs.iter().map(TensorDesc::byte_size).sum::<usize>() + bias_desc.byte_size();
        self.pending.push(PendingBind::Params {
            op: handle.0,
            params: PendingParams {
                weight,
                bias,
                weight_descs,
                segments,
                bias_desc,
            },
        });
        Ok(handle)
    }

    /// Declares a 2x2 max pooling.
    pub fn add_pool(&mut self, name: &str, src: OpHandle) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        let (src_id, src_desc) = self.output_of(src)?;
        let op = self.engine.new_pool(PoolDesc { src: src_desc })?;
        self.add_op(name, op, &[src_id], false)
    }

    /// Declares a 2x nearest-neighbour upsampling.
    pub fn add_upsample(&mut self, name: &str, src: OpHandle) -> Result<OpHandle, GraphError> {
        self.ensure_building()?;
        let (src_id, src_desc) = self.output_of(src)?;
        let op = self.engine.new_upsample(UpsampleDesc { src: src_desc })?;
        self.add_op(name, op, &[src_id], false)
    }

    /// Appends an op reading `srcs`, optionally forcing them to be contiguous.
    ///
    /// Links are added before the op's own record so that a rejected link
    /// leaves the graph as it was.
    fn add_op(
        &mut self,
        name: &str,
        mut op: Box<dyn Op>,
        srcs: &[AllocId],
        contiguous: bool,
    ) -> Result<OpHandle, GraphError> {
        let id = self.ops.len();
        if contiguous {
            for pair in srcs.windows(2) {
                self.allocs.link(pair[0], pair[1])?;
            }
        }
        for &src in srcs {
            self.allocs.extend_lifetime(src, id);
        }

        op.set_name(name.to_string());
        let dst = op.dst_desc().map(|desc| self.allocs.push(desc, id));
        if !srcs.is_empty() {
            self.pending.push(PendingBind::Src {
                op: id,
                srcs: srcs.to_vec(),
            });
        }
        if let Some(dst) = dst {
            self.pending.push(PendingBind::Dst { op: id, dst });
        }

        debug!(op = id, name, kind = %op.kind(), "declared op");
        self.outputs.push(dst);
        self.ops.push(op);
        self.dirty = true;
        Ok(OpHandle(id))
    }

    fn ensure_building(&self) -> Result<(), GraphError> {
        if self.finalized {
            return Err(GraphError::Finalized);
        }
        Ok(())
    }

    fn output_of(&self, handle: OpHandle) -> Result<(AllocId, TensorDesc), GraphError> {
        match self.outputs.get(handle.0) {
            None => Err(GraphError::UnknownOp(handle.0)),
            Some(None) => Err(GraphError::NoOutput(self.ops[handle.0].name().to_string())),
            Some(Some(id)) => Ok((*id, self.allocs.get(*id).desc.clone())),
        }
    }

    fn conv_weights(&self, name: &str) -> Result<(Tensor, Tensor), GraphError> {
        let lookup = |suffix: &str| {
            let key = format!("{name}.{suffix}");
            self.weights.get(&key).cloned().ok_or(GraphError::MissingWeight(key))
        };
        let weight = lookup("weight")?;
        let bias = lookup("bias")?;

        let (wd, bd) = (weight.desc(), bias.desc());
        if wd.rank() != 4 || wd.layout() != TensorLayout::Oihw {
            return Err(invalid_weight(name, format!("weight must be oihw, got {} of rank {}", wd.layout(), wd.rank())));
        }
        if bd.rank() != 1 || bd.x() != wd.o() {
            return Err(invalid_weight(
                name,
                format!("bias has {:?} elements for {} output channels", bd.dims().as_slice(), wd.o()),
            ));
        }
        Ok((weight, bias))
    }

    fn device_weight_desc(&self, stored: &TensorDesc, padded_i: usize) -> Result<TensorDesc, GraphError> {
        let device = self.engine.device();
        Ok(TensorDesc::new(
            stored.dims().clone(),
            TensorDims::oihw(round_up(stored.o(), device.block_c), padded_i, stored.h(), stored.w()),
            device.weight_layout,
            device.dtype,
        )?)
    }

    fn device_bias_desc(&self, stored: &TensorDesc) -> Result<TensorDesc, GraphError> {
        let device = self.engine.device();
        Ok(TensorDesc::new(
            stored.dims().clone(),
            TensorDims::x(round_up(stored.x(), device.block_c)),
            TensorLayout::X,
            device.dtype,
        )?)
    }

    // ── Planning ───────────────────────────────────────────────────

    fn plan(&mut self) -> Result<(), GraphError> {
        self.allocs.validate_lifetimes(self.ops.len())?;
        self.stats = self.allocs.plan();
        self.tensor_scratch_byte_size = self.stats.packed_bytes;
        self.op_scratch_byte_size = self
            .ops
            .iter()
            .map(|op| round_up(op.scratch_byte_size(), MEMORY_ALIGNMENT))
            .max()
            .unwrap_or(0);
        self.dirty = false;
        debug!(
            ops = self.ops.len(),
            op_scratch = self.op_scratch_byte_size,
            tensor_scratch = self.tensor_scratch_byte_size,
            "planned scratch"
        );
        Ok(())
    }

    /// Bytes of scratch the graph needs: the largest op scratch, aligned,
    /// followed by the packed intermediate tensors.
    ///
    /// Plans on demand if ops were declared since the last call.
    pub fn scratch_byte_size(&mut self) -> Result<usize, GraphError> {
        if self.dirty {
            self.plan()?;
        }
        Ok(self.op_scratch_byte_size + self.tensor_scratch_byte_size)
    }

    /// Bytes of reordered weights and biases the graph owns.
    pub fn private_byte_size(&self) -> usize {
        self.private_byte_size
    }

    /// Statistics of the last planning pass.
    pub fn plan_stats(&self) -> PlanStats {
        self.stats
    }

    /// Offsets of every planned tensor. Empty once the graph is finalized.
    pub fn planned_layout(&mut self) -> Result<Vec<PlannedTensor>, GraphError> {
        if self.dirty {
            self.plan()?;
        }
        let base = self.op_scratch_byte_size;
        Ok(self
            .allocs
            .iter()
            .map(|(_, r)| PlannedTensor {
                producer: self.ops[r.first_op].name().to_string(),
                desc: r.desc.clone(),
                byte_offset: base + r.byte_offset,
                byte_size: r.byte_size,
                first_op: r.first_op,
                last_op: r.last_op,
            })
            .collect())
    }

    /// Sets the buffer that will back all intermediate tensors.
    ///
    /// It must be at least [`scratch_byte_size`](Self::scratch_byte_size)
    /// bytes when [`finalize`](Self::finalize) is called. Several graphs may
    /// share one buffer as long as they never run at the same time.
    ///
    /// Ops are bound to the buffer at finalize, so it cannot be replaced
    /// afterwards.
    pub fn set_scratch(&mut self, scratch: Buffer) -> Result<(), GraphError> {
        self.ensure_building()?;
        self.scratch = Some(scratch);
        Ok(())
    }

    // ── Finalization and execution ─────────────────────────────────

    /// Binds every op to its tensors and parameters, making the graph runnable.
    ///
    /// Allocation records and stored weight handles are released afterwards.
    /// If this fails the graph is left half-bound and must be cleared.
    pub fn finalize(&mut self) -> Result<(), GraphError> {
        self.ensure_building()?;
        if self.dirty {
            self.plan()?;
        }
        let scratch = self.scratch.clone().ok_or(GraphError::ScratchNotSet)?;
        let required = self.op_scratch_byte_size + self.tensor_scratch_byte_size;
        if scratch.size() < required {
            return Err(GraphError::ScratchTooSmall {
                required,
                actual: scratch.size(),
            });
        }

        let base = self.op_scratch_byte_size;
        let tensors = self
            .allocs
            .iter()
            .map(|(_, r)| scratch.tensor(r.desc.clone(), base + r.byte_offset))
            .collect::<Result<Vec<_>, _>>()?;

        for bind in std::mem::take(&mut self.pending) {
            match bind {
                PendingBind::Src { op, srcs } => {
                    let srcs = srcs.iter().map(|s| tensors[s.index()].clone()).collect();
                    self.ops[op].bind_src(srcs)?;
                }
                PendingBind::Dst { op, dst } => self.ops[op].bind_dst(tensors[dst.index()].clone())?,
                PendingBind::Params { op, params } => {
                    let params = params.reorder(self.engine.as_ref())?;
                    self.ops[op].bind_params(params)?;
                }
            }
        }

        for op in &mut self.ops {
            op.bind_scratch(scratch.clone());
            op.finalize()?;
        }

        self.allocs.clear();
        self.outputs.clear();
        self.finalized = true;
        info!(
            engine = self.engine.id(),
            ops = self.ops.len(),
            scratch_bytes = required,
            private_bytes = self.private_byte_size,
            "graph finalized"
        );
        Ok(())
    }

    /// Points every op at a new tile.
    pub fn set_tile(&mut self, tile: &TileRegion) {
        for op in &mut self.ops {
            op.set_tile(tile);
        }
    }

    /// Submits every op in order, advancing `progress` by one per op.
    ///
    /// Returns [`RunStatus::Cancelled`] as soon as the progress callback
    /// asks to stop. Submission does not wait for completion; use
    /// [`Engine::wait`].
    pub fn run(&mut self, progress: &mut Progress) -> Result<RunStatus, GraphError> {
        if !self.finalized {
            return Err(GraphError::NotFinalized);
        }
        for op in &mut self.ops {
            op.submit()?;
            if !progress.update(1) {
                debug!(op = op.name(), "run cancelled");
                return Ok(RunStatus::Cancelled);
            }
        }
        Ok(RunStatus::Completed)
    }

    /// Drops all ops, records and the scratch reference, returning the
    /// graph to an empty, unfinalized state.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.outputs.clear();
        self.allocs.clear();
        self.pending.clear();
        self.scratch = None;
        self.op_scratch_byte_size = 0;
        self.tensor_scratch_byte_size = 0;
        self.private_byte_size = 0;
        self.stats = PlanStats::default();
        self.dirty = false;
        self.finalized = false;
    }

    // ── Introspection ──────────────────────────────────────────────

    /// Returns `true` if every op can run on the engine.
    pub fn is_supported(&self) -> bool {
        self.ops.iter().all(|op| op.is_supported())
    }

    /// Progress units one [`run`](Self::run) reports.
    pub fn work_amount(&self) -> usize {
        self.ops.len()
    }

    pub fn num_ops(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Kind and name of every op, in execution order.
    pub fn ops(&self) -> impl Iterator<Item = (OpKind, &str)> {
        self.ops.iter().map(|op| (op.kind(), op.name()))
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Graph on engine {}: {} ops, scratch {:.2} MB (ops {:.2} MB + tensors {:.2} MB), weights {:.2} MB{}",
            self.engine.id(),
            self.ops.len(),
            mb(self.op_scratch_byte_size + self.tensor_scratch_byte_size),
            mb(self.op_scratch_byte_size),
            mb(self.tensor_scratch_byte_size),
            mb(self.private_byte_size),
            if self.finalized { ", finalized" } else { "" }
        )
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("engine", &self.engine.id())
            .field("ops", &self.ops.len())
            .field("records", &self.allocs.len())
            .field("finalized", &self.finalized)
            .finish()
    }
}

fn invalid_weight(name: &str, detail: String) -> GraphError {
    GraphError::InvalidWeight {
        name: name.to_string(),
        detail,
    }
}

fn mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostEngine, HostEngineConfig};
    use tensor_core::DType;
    use tiling_planner::TilingPlan;

    fn weights(entries: &[(&str, usize, usize)]) -> Arc<WeightMap> {
        let mut map = WeightMap::new();
        for &(name, o, i) in entries {
            let w = TensorDesc::dense(TensorDims::oihw(o, i, 3, 3), TensorLayout::Oihw, DType::F16).unwrap();
            let values: Vec<f32> = (0..w.num_elements()).map(|n| (n % 7) as f32).collect();
            map.insert(format!("{name}.weight"), Tensor::from_f32(w, &values).unwrap());
            let b = TensorDesc::dense(TensorDims::x(o), TensorLayout::X, DType::F16).unwrap();
            map.insert(format!("{name}.bias"), Tensor::zeros(b));
        }
        Arc::new(map)
    }

    fn host(config: HostEngineConfig) -> Arc<HostEngine> {
        Arc::new(HostEngine::new(0, config).unwrap())
    }

    fn graph(engine: &Arc<HostEngine>, weights: Arc<WeightMap>) -> Graph {
        Graph::new(engine.clone(), weights)
    }

    fn tile(size: usize) -> TileRegion {
        TilingPlan::fixed(size, size, size, size, 0, 16, 1).regions().next().unwrap()
    }

    fn finalize(g: &mut Graph) {
        let size = g.scratch_byte_size().unwrap();
        g.set_scratch(Buffer::new(size)).unwrap();
        g.finalize().unwrap();
    }

    #[test]
    fn test_declare_after_finalize_fails() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        g.add_output_process("output", input).unwrap();
        finalize(&mut g);
        assert!(matches!(g.add_pool("pool", input), Err(GraphError::Finalized)));
        assert!(matches!(g.finalize(), Err(GraphError::Finalized)));
    }

    #[test]
    fn test_scratch_cannot_be_replaced_after_finalize() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        g.add_output_process("output", input).unwrap();
        finalize(&mut g);

        let size = g.scratch_byte_size().unwrap();
        assert!(matches!(g.set_scratch(Buffer::new(size)), Err(GraphError::Finalized)));

        // After clear the graph takes a new buffer again.
        g.clear();
        assert!(g.set_scratch(Buffer::new(size)).is_ok());
    }

    #[test]
    fn test_run_requires_finalize() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        assert!(matches!(g.run(&mut Progress::new()), Err(GraphError::NotFinalized)));
    }

    #[test]
    fn test_missing_weight() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let r = g.add_conv("enc_conv0", input, Activation::ReLU, PostOp::None);
        assert!(matches!(r, Err(GraphError::MissingWeight(k)) if k == "enc_conv0.weight"));
    }

    #[test]
    fn test_channel_mismatch_is_invalid_weight() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[("conv", 8, 4)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let r = g.add_conv("conv", input, Activation::ReLU, PostOp::None);
        assert!(matches!(r, Err(GraphError::InvalidWeight { .. })));
    }

    #[test]
    fn test_output_process_has_no_output() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let out = g.add_output_process("output", input).unwrap();
        assert!(matches!(g.add_pool("pool", out), Err(GraphError::NoOutput(n)) if n == "output"));
        assert!(matches!(g.add_pool("pool", OpHandle(42)), Err(GraphError::UnknownOp(42))));
    }

    #[test]
    fn test_unfused_post_op_is_split() {
        let engine = host(HostEngineConfig {
            fused_post_ops: false,
            ..Default::default()
        });
        let mut g = graph(&engine, weights(&[("enc_conv1", 16, 3)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let pooled = g.add_conv("enc_conv1", input, Activation::ReLU, PostOp::Pool).unwrap();
        let ops: Vec<_> = g.ops().map(|(k, n)| (k, n.to_string())).collect();
        assert_eq!(
            ops,
            vec![
                (OpKind::InputProcess, "input".to_string()),
                (OpKind::Conv, "enc_conv1".to_string()),
                (OpKind::Pool, "enc_conv1_pool".to_string()),
            ]
        );
        assert_eq!(pooled.index(), 2);
        let (_, desc) = g.output_of(pooled).unwrap();
        assert_eq!(desc.dims(), &TensorDims::chw(16, 16, 16));
    }

    #[test]
    fn test_concat_sources_are_contiguous() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[("a", 16, 3), ("cat", 8, 19)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let a = g.add_conv("a", input, Activation::ReLU, PostOp::None).unwrap();
        let cat = g.add_concat_conv("cat", a, input, Activation::ReLU).unwrap();
        g.add_output_process("output", cat).unwrap();

        let layout = g.planned_layout().unwrap();
        let a_rec = layout.iter().find(|t| t.producer == "a").unwrap();
        let in_rec = layout.iter().find(|t| t.producer == "input").unwrap();
        assert_eq!(a_rec.byte_offset + a_rec.byte_size, in_rec.byte_offset);
    }

    #[test]
    fn test_conflicting_concat_links_fail() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[("a", 16, 3), ("b", 16, 3), ("cat1", 8, 32), ("cat2", 8, 19)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let a = g.add_conv("a", input, Activation::ReLU, PostOp::None).unwrap();
        let b = g.add_conv("b", input, Activation::ReLU, PostOp::None).unwrap();
        g.add_concat_conv("cat1", a, b, Activation::ReLU).unwrap();
        // `a` already precedes `b`; it cannot also precede `input`.
        let r = g.add_concat_conv("cat2", a, input, Activation::ReLU);
        assert!(matches!(r, Err(GraphError::InvalidAllocation(_))));
        assert_eq!(g.num_ops(), 4);
    }

    #[test]
    fn test_hwc_concat_splits_weight() {
        let engine = host(HostEngineConfig {
            device: crate::DeviceConfig {
                block_c: 8,
                tensor_layout: TensorLayout::Hwc,
                weight_layout: TensorLayout::OIhw8i8o,
                dtype: DType::F32,
            },
            ..Default::default()
        });
        let mut g = graph(&engine, weights(&[("a", 16, 3), ("cat", 8, 19)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 16, 16), 16).unwrap();
        let a = g.add_conv("a", input, Activation::ReLU, PostOp::None).unwrap();
        g.add_concat_conv("cat", a, input, Activation::ReLU).unwrap();

        // a: 8x16 padded input, cat: 8x16 + 8x8 split, biases padded to 16 and 8.
        let w = |o: usize, i: usize| o * i * 9 * 4;
        assert_eq!(g.private_byte_size(), w(16, 8) + 16 * 4 + w(8, 16) + w(8, 8) + 8 * 4);
        finalize(&mut g);
    }

    #[test]
    fn test_private_bytes_count_padded_weights() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[("conv", 20, 3)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        g.add_conv("conv", input, Activation::ReLU, PostOp::None).unwrap();
        // O 20 -> 32, I 3 -> 16, f16.
        assert_eq!(g.private_byte_size(), 32 * 16 * 9 * 2 + 32 * 2);
    }

    #[test]
    fn test_scratch_checks() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        g.add_output_process("output", input).unwrap();
        assert!(matches!(g.finalize(), Err(GraphError::ScratchNotSet)));

        let required = g.scratch_byte_size().unwrap();
        g.set_scratch(Buffer::new(required - 1)).unwrap();
        assert!(matches!(
            g.finalize(),
            Err(GraphError::ScratchTooSmall { required: r, .. }) if r == required
        ));
    }

    #[test]
    fn test_op_scratch_precedes_tensors() {
        let engine = host(HostEngineConfig {
            conv_scratch_bytes: 100,
            ..Default::default()
        });
        let mut g = graph(&engine, weights(&[("conv", 16, 3)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        g.add_conv("conv", input, Activation::ReLU, PostOp::None).unwrap();
        let size = g.scratch_byte_size().unwrap();
        let op_scratch = round_up(100, MEMORY_ALIGNMENT);
        assert_eq!(size, op_scratch + g.plan_stats().packed_bytes);
        assert!(g.planned_layout().unwrap().iter().all(|t| t.byte_offset >= op_scratch));
    }

    #[test]
    fn test_run_submits_in_order() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[("conv", 16, 3)]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let conv = g.add_conv("conv", input, Activation::ReLU, PostOp::Pool).unwrap();
        let up = g.add_upsample("up", conv).unwrap();
        g.add_output_process("output", up).unwrap();
        finalize(&mut g);

        g.set_tile(&tile(32));
        let mut progress = Progress::new();
        progress.start(g.work_amount());
        assert_eq!(g.run(&mut progress).unwrap(), RunStatus::Completed);
        engine.wait().unwrap();

        let names: Vec<_> = engine.trace().into_iter().map(|r| r.op).collect();
        assert_eq!(names, vec!["input", "conv", "up", "output"]);
        assert_eq!(progress.done(), 4);
    }

    #[test]
    fn test_cancellation_stops_submission() {
        let engine = host(HostEngineConfig::default());
        let mut g = graph(&engine, weights(&[]));
        let input = g.add_input_process("input", TensorDims::chw(3, 32, 32), 16).unwrap();
        let pool = g.add_pool("pool", input).unwrap();
        g.add_output_process("output", pool).unwrap();
        finalize(&mut g);
        g.set_tile(&tile(32));

        let mut progress = Progress::with_callback(|fraction| fraction < 0.5);
        progress.start(g.work_amount());
        assert_eq!(g.run(&mut progress).unwrap(), RunStatus::Cancelled);
        engine.wait().unwrap();
        assert_eq!(engine.trace().len(), 2);
    }

    #[test]
    fn test_clear_and_rebuild() {
        let engine = host(HostEngineConfig::default());
        let w = weights(&[("conv", 16, 3)]);
        let mut g = graph(&engine, w);
        let build = |g: &mut Graph| {
            let input = g.add_input_process("input", TensorDims::chw(3, 48, 48), 16).unwrap();
            let conv = g.add_conv("conv", input, Activation::ReLU, PostOp::None).unwrap();
            g.add_output_process("output", conv).unwrap();
            g.scratch_byte_size().unwrap()
        };
        let first = build(&mut g);
        finalize(&mut g);
        g.clear();
        assert!(g.is_empty() && !g.is_finalized());
        assert_eq!(g.private_byte_size(), 0);
        assert_eq!(build(&mut g), first);
        finalize(&mut g);
    }
}
