// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Tensor descriptors and host memory for the denoising runtime.
//!
//! This crate provides:
//! - [`TensorDesc`]: logical and padded dims, [`TensorLayout`] and [`DType`].
//! - [`Buffer`]: a shared byte region; [`Tensor`] is a typed view into one.
//! - Weight and bias reordering from the on-disk `oihw` layout into blocked
//!   device layouts ([`reorder_weight`], [`reorder_bias`]).
//! - Integer helpers used throughout planning ([`round_up`], [`ceil_div`]).
//!
//! # Design Goals
//! - Many tensors may view one buffer at different offsets.
//! - Descriptors are validated once at construction.
//! - Clean error types via `thiserror`.

mod buffer;
mod desc;
mod dims;
mod dtype;
mod error;
mod layout;
mod reorder;
mod tensor;

pub use buffer::Buffer;
pub use desc::{TensorDesc, MEMORY_ALIGNMENT};
pub use dims::{ceil_div, round_up, TensorDims};
pub use dtype::DType;
pub use error::TensorError;
pub use layout::TensorLayout;
pub use reorder::{is_weight_reorder_supported, reorder_bias, reorder_weight};
pub use tensor::{Tensor, TensorRead, TensorWrite};
