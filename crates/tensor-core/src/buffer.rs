// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host-visible memory buffers.
//!
//! A [`Buffer`] is a reference-counted, zero-initialised byte region.
//! Cloning a buffer clones the handle, not the memory: every [`Tensor`]
//! created with [`Buffer::tensor`] is a view into the same bytes. This is how
//! one scratch buffer backs all temporary tensors of a graph.

use crate::{Tensor, TensorDesc, TensorError};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A shared byte buffer.
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<RwLock<Vec<u8>>>,
    size: usize,
}

impl Buffer {
    /// Allocates a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0u8; size])
    }

    /// Wraps existing bytes.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let size = data.len();
        Self {
            inner: Arc::new(RwLock::new(data)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Creates a tensor view of `desc` starting at `byte_offset`.
    pub fn tensor(&self, desc: TensorDesc, byte_offset: usize) -> Result<Tensor, TensorError> {
        let size = desc.byte_size();
        if byte_offset + size > self.size {
            return Err(TensorError::ViewOutOfRange {
                offset: byte_offset,
                size,
                buffer_size: self.size,
            });
        }
        Ok(Tensor::view(desc, self.clone(), byte_offset))
    }

    /// Returns `true` if both handles refer to the same memory.
    pub fn same_memory(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copies the whole buffer out (mostly useful in tests).
    pub fn to_vec(&self) -> Vec<u8> {
        self.read().clone()
    }

    // A poisoned lock only means another thread panicked mid-write; the bytes
    // are still valid memory, so recover the guard instead of propagating.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("size", &self.size)
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}
