// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory planning.

/// Errors that can occur while recording or planning tensor allocations.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A contiguity link was requested on records that are already linked
    /// in that direction, or that would close a cycle.
    #[error("invalid tensor allocation constraints: cannot link record {prev} before record {next}")]
    InvalidLink { prev: usize, next: usize },

    /// A record's lifetime references an op outside the graph.
    #[error("record {record} lives over ops [{first_op}, {last_op}] but the graph has {num_ops} ops")]
    LifetimeOutOfRange {
        record: usize,
        first_op: usize,
        last_op: usize,
        num_ops: usize,
    },

    /// The budget string could not be parsed or is zero.
    #[error("invalid memory budget '{0}': expected a positive number followed by an optional suffix (K, M, G)")]
    InvalidBudget(String),
}
