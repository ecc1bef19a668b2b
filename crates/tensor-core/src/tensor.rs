// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensors as typed views over a [`Buffer`].

use crate::{Buffer, DType, TensorDesc, TensorError};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

/// A tensor: a descriptor plus a byte offset into a shared buffer.
///
/// Tensors are cheap handles. Two tensors created from the same scratch
/// buffer may alias; the memory planner guarantees that tensors alive at the
/// same time never do.
#[derive(Debug, Clone)]
pub struct Tensor {
    desc: TensorDesc,
    buffer: Buffer,
    byte_offset: usize,
}

impl Tensor {
    /// Creates a tensor backed by its own zero-filled buffer.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::{DType, Tensor, TensorDesc, TensorDims, TensorLayout};
    /// let desc = TensorDesc::dense(TensorDims::chw(2, 3, 4), TensorLayout::Chw, DType::F32).unwrap();
    /// let t = Tensor::zeros(desc);
    /// assert_eq!(t.byte_size(), 2 * 3 * 4 * 4);
    /// ```
    pub fn zeros(desc: TensorDesc) -> Self {
        let buffer = Buffer::new(desc.byte_size());
        Self::view(desc, buffer, 0)
    }

    /// Creates a tensor from raw little-endian bytes.
    ///
    /// Returns an error if the byte count does not match `desc.byte_size()`.
    pub fn from_bytes(desc: TensorDesc, data: Vec<u8>) -> Result<Self, TensorError> {
        let expected = desc.byte_size();
        if data.len() != expected {
            return Err(TensorError::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::view(desc, Buffer::from_bytes(data), 0))
    }

    /// Creates a tensor from `f32` values in layout order, converting to the
    /// descriptor's element type.
    pub fn from_f32(desc: TensorDesc, values: &[f32]) -> Result<Self, TensorError> {
        if values.len() != desc.num_elements() {
            return Err(TensorError::BufferSizeMismatch {
                expected: desc.byte_size(),
                actual: values.len() * desc.dtype().size_bytes(),
            });
        }
        let elem = desc.dtype().size_bytes();
        let mut data = vec![0u8; desc.byte_size()];
        for (chunk, &v) in data.chunks_exact_mut(elem).zip(values) {
            desc.dtype().write(chunk, v);
        }
        Ok(Self::view(desc, Buffer::from_bytes(data), 0))
    }

    pub(crate) fn view(desc: TensorDesc, buffer: Buffer, byte_offset: usize) -> Self {
        Self {
            desc,
            buffer,
            byte_offset,
        }
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn dtype(&self) -> DType {
        self.desc.dtype()
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_size(&self) -> usize {
        self.desc.byte_size()
    }

    /// Returns `true` if the byte ranges of the two tensors intersect.
    pub fn overlaps(&self, other: &Tensor) -> bool {
        self.buffer.same_memory(&other.buffer)
            && self.byte_offset < other.byte_offset + other.byte_size()
            && other.byte_offset < self.byte_offset + self.byte_size()
    }

    /// Maps the tensor for reading.
    ///
    /// Holding a read mapping blocks writers to the *whole* buffer, so do not
    /// hold it while mapping another view of the same buffer for writing.
    pub fn map_read(&self) -> TensorRead<'_> {
        TensorRead {
            tensor: self,
            guard: self.buffer.read(),
        }
    }

    /// Maps the tensor for writing.
    pub fn map_write(&self) -> TensorWrite<'_> {
        TensorWrite {
            tensor: self,
            guard: self.buffer.write(),
        }
    }

    /// Reads the whole tensor as `f32` in layout (memory) order.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let map = self.map_read();
        let elem = self.dtype().size_bytes();
        map.bytes()
            .chunks_exact(elem)
            .map(|b| self.dtype().read(b))
            .collect()
    }

    fn byte_index(&self, index: &[usize]) -> usize {
        let padded = self.desc.padded_dims().as_slice();
        debug_assert!(
            index.iter().zip(padded).all(|(i, p)| i < p),
            "index {index:?} out of bounds for padded dims {padded:?}"
        );
        let elem = self.desc.layout().element_offset(padded, index);
        self.byte_offset + elem * self.dtype().size_bytes()
    }
}

/// Read access to a tensor's elements.
pub struct TensorRead<'a> {
    tensor: &'a Tensor,
    guard: RwLockReadGuard<'a, Vec<u8>>,
}

impl TensorRead<'_> {
    /// Reads the element at a logical index (padded coordinates), widened to `f32`.
    pub fn get(&self, index: &[usize]) -> f32 {
        let at = self.tensor.byte_index(index);
        self.tensor.dtype().read(&self.guard[at..])
    }

    /// The tensor's bytes.
    pub fn bytes(&self) -> &[u8] {
        let start = self.tensor.byte_offset;
        &self.guard[start..start + self.tensor.byte_size()]
    }
}

/// Write access to a tensor's elements.
pub struct TensorWrite<'a> {
    tensor: &'a Tensor,
    guard: RwLockWriteGuard<'a, Vec<u8>>,
}

impl TensorWrite<'_> {
    pub fn get(&self, index: &[usize]) -> f32 {
        let at = self.tensor.byte_index(index);
        self.tensor.dtype().read(&self.guard[at..])
    }

    /// Writes the element at `index`, narrowing to the tensor's element type.
    pub fn set(&mut self, index: &[usize], value: f32) {
        let at = self.tensor.byte_index(index);
        self.tensor.dtype().write(&mut self.guard[at..], value);
    }

    /// Zeroes the tensor's byte range.
    pub fn fill_zero(&mut self) {
        let start = self.tensor.byte_offset;
        self.guard[start..start + self.tensor.byte_size()].fill(0);
    }
}
