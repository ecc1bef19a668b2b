// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Packing statistics for diagnostics and tuning.

/// What one planning pass achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PlanStats {
    pub num_records: usize,
    pub num_chunks: usize,
    /// Tensor scratch size: the highest end offset of any record.
    pub packed_bytes: usize,
    /// Size if every record had its own memory.
    pub naive_bytes: usize,
}

impl PlanStats {
    /// Fraction of the naive footprint saved by reuse, in `[0.0, 1.0]`.
    ///
    /// Returns `0.0` for an empty plan.
    pub fn reuse_ratio(&self) -> f64 {
        if self.naive_bytes == 0 {
            return 0.0;
        }
        1.0 - self.packed_bytes as f64 / self.naive_bytes as f64
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        let mb = |b: usize| b as f64 / (1024.0 * 1024.0);
        format!(
            "{} records in {} chunks: packed {:.2} MB vs naive {:.2} MB ({:.0}% reuse)",
            self.num_records,
            self.num_chunks,
            mb(self.packed_bytes),
            mb(self.naive_bytes),
            self.reuse_ratio() * 100.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let s = PlanStats::default();
        assert_eq!(s.reuse_ratio(), 0.0);
    }

    #[test]
    fn test_reuse_ratio() {
        let s = PlanStats {
            num_records: 4,
            num_chunks: 3,
            packed_bytes: 250,
            naive_bytes: 1000,
        };
        assert!((s.reuse_ratio() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_summary() {
        let s = PlanStats {
            num_records: 4,
            num_chunks: 3,
            packed_bytes: 1024 * 1024,
            naive_bytes: 2 * 1024 * 1024,
        };
        let summary = s.summary();
        assert!(summary.contains("4 records in 3 chunks"));
        assert!(summary.contains("50% reuse"));
    }
}
