// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The allocation table and the chunk packing algorithm.
//!
//! Every temporary tensor of a graph gets one [`TensorAlloc`] record with a
//! closed lifetime `[first_op, last_op]` measured in op indices. Records can
//! be linked with `prev`/`next` to demand that they sit back to back in
//! memory (a concatenation reads its two inputs as one tensor). A maximal
//! linked run of records is a [`Chunk`]; chunks are the unit of placement.
//!
//! ```text
//!   offset ▲
//!          │        ┌───────┐
//!          │ ┌────┐ │   D   │        chunk {B, C}: one placement,
//!          │ │ B  │ ├───────┤        members at cumulative offsets
//!          │ ├────┤ │   E   │
//!          │ │ C  │ └───────┘
//!          └─┴────┴──────────────► op index
//! ```
//!
//! Placement is greedy: chunks in descending size order, each into the
//! smallest gap between time-overlapping placed records that fits, else on
//! top of them. Deterministic, not optimal.

use crate::{PlanError, PlanStats};
use tensor_core::TensorDesc;
use tracing::debug;

/// Index of a record in an [`AllocationTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct AllocId(usize);

impl AllocId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for AllocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One temporary tensor to be placed in the scratch buffer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TensorAlloc {
    pub desc: TensorDesc,
    /// Aligned byte size.
    pub byte_size: usize,
    pub first_op: usize,
    pub last_op: usize,
    pub prev: Option<AllocId>,
    pub next: Option<AllocId>,
    /// Assigned by [`AllocationTable::plan`].
    pub byte_offset: usize,
}

impl TensorAlloc {
    /// Returns `true` if the two closed lifetimes intersect.
    pub fn lives_with(&self, first_op: usize, last_op: usize) -> bool {
        self.first_op <= last_op && first_op <= self.last_op
    }

    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.byte_offset + self.byte_size
    }
}

/// A maximal run of linked records placed as one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Members in link order, head first.
    pub members: Vec<AllocId>,
    pub byte_size: usize,
    pub first_op: usize,
    pub last_op: usize,
}

/// All allocation records of one graph under construction.
#[derive(Debug, Clone, Default)]
pub struct AllocationTable {
    records: Vec<TensorAlloc>,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record produced by `op_id` and alive only during it.
    pub fn push(&mut self, desc: TensorDesc, op_id: usize) -> AllocId {
        let id = AllocId(self.records.len());
        let byte_size = desc.aligned_byte_size();
        self.records.push(TensorAlloc {
            desc,
            byte_size,
            first_op: op_id,
            last_op: op_id,
            prev: None,
            next: None,
            byte_offset: 0,
        });
        id
    }

    /// Extends a record's lifetime so it is still alive at `op_id`.
    pub fn extend_lifetime(&mut self, id: AllocId, op_id: usize) {
        let r = &mut self.records[id.0];
        r.last_op = r.last_op.max(op_id);
    }

    /// Requires `next` to be placed immediately after `prev`.
    ///
    /// Fails if `prev` already has a successor, `next` already has a
    /// predecessor, or the link would close a cycle.
    pub fn link(&mut self, prev: AllocId, next: AllocId) -> Result<(), PlanError> {
        let err = PlanError::InvalidLink {
            prev: prev.0,
            next: next.0,
        };
        if prev == next || self.records[prev.0].next.is_some() || self.records[next.0].prev.is_some() {
            return Err(err);
        }
        // `next` has no predecessor, so it heads its run; reaching it from
        // `prev` backwards means both are already in the same run.
        if self.head_of(prev) == next {
            return Err(err);
        }
        self.records[prev.0].next = Some(next);
        self.records[next.0].prev = Some(prev);
        Ok(())
    }

    fn head_of(&self, mut id: AllocId) -> AllocId {
        while let Some(p) = self.records[id.0].prev {
            id = p;
        }
        id
    }

    pub fn get(&self, id: AllocId) -> &TensorAlloc {
        &self.records[id.0]
    }

    /// Offset of a record after planning.
    pub fn offset(&self, id: AllocId) -> usize {
        self.records[id.0].byte_offset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AllocId, &TensorAlloc)> {
        self.records.iter().enumerate().map(|(i, r)| (AllocId(i), r))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Checks that every lifetime lies within `[0, num_ops - 1]`.
    pub fn validate_lifetimes(&self, num_ops: usize) -> Result<(), PlanError> {
        for (i, r) in self.records.iter().enumerate() {
            if r.first_op > r.last_op || r.last_op >= num_ops {
                return Err(PlanError::LifetimeOutOfRange {
                    record: i,
                    first_op: r.first_op,
                    last_op: r.last_op,
                    num_ops,
                });
            }
        }
        Ok(())
    }

    /// Groups records into chunks, one per record without a predecessor,
    /// in record order.
    pub fn chunks(&self) -> Vec<Chunk> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.prev.is_none())
            .map(|(head, _)| {
                let mut members = vec![AllocId(head)];
                let mut cur = head;
                while let Some(n) = self.records[cur].next {
                    members.push(n);
                    cur = n.0;
                }
                let byte_size = members.iter().map(|m| self.records[m.0].byte_size).sum();
                let first_op = members.iter().map(|m| self.records[m.0].first_op).min().unwrap_or(0);
                let last_op = members.iter().map(|m| self.records[m.0].last_op).max().unwrap_or(0);
                Chunk {
                    members,
                    byte_size,
                    first_op,
                    last_op,
                }
            })
            .collect()
    }

    /// Assigns a byte offset to every record.
    ///
    /// Returns statistics whose `packed_bytes` is the tensor scratch size:
    /// the maximum end offset over all records.
    pub fn plan(&mut self) -> PlanStats {
        let mut chunks = self.chunks();
        // Stable: equal sizes keep record order.
        chunks.sort_by(|a, b| b.byte_size.cmp(&a.byte_size));

        // Placed records, ascending by offset.
        let mut active: Vec<AllocId> = Vec::with_capacity(self.records.len());
        let mut packed_bytes = 0;

        for chunk in &chunks {
            let mut frontier = 0;
            let mut best: Option<(usize, usize)> = None; // (gap, offset)

            for &a in &active {
                let r = &self.records[a.0];
                if !r.lives_with(chunk.first_op, chunk.last_op) {
                    continue;
                }
                if r.byte_offset >= frontier {
                    let gap = r.byte_offset - frontier;
                    if gap >= chunk.byte_size && best.map_or(true, |(g, _)| gap < g) {
                        best = Some((gap, frontier));
                    }
                }
                frontier = frontier.max(r.end());
            }

            let mut offset = best.map_or(frontier, |(_, o)| o);
            debug!(
                head = chunk.members[0].0,
                members = chunk.members.len(),
                bytes = chunk.byte_size,
                offset,
                reused_gap = best.is_some(),
                "placed chunk"
            );

            for &m in &chunk.members {
                self.records[m.0].byte_offset = offset;
                offset += self.records[m.0].byte_size;
                let pos = active.partition_point(|a| self.records[a.0].byte_offset <= self.records[m.0].byte_offset);
                active.insert(pos, m);
            }
            packed_bytes = packed_bytes.max(offset);
        }

        PlanStats {
            num_records: self.records.len(),
            num_chunks: chunks.len(),
            packed_bytes,
            naive_bytes: self.records.iter().map(|r| r.byte_size).sum(),
        }
    }
}
