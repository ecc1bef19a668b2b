// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory budget configuration and parsing.
//!
//! A [`MemoryBudget`] caps the estimated device memory of all per-engine
//! graphs together. It supports human-readable string parsing so that it can
//! be written in config files and on the command line.

use crate::PlanError;
use std::fmt;

const KB: usize = 1024;
const MB: usize = 1024 * KB;
const GB: usize = 1024 * MB;

/// A memory ceiling for the tiled model.
///
/// # Parsing
/// Supports human-readable strings with binary suffixes:
/// - `"600M"` or `"600MB"` → 600 × 1024² bytes
/// - `"1G"` or `"1GB"` → 1 × 1024³ bytes
/// - `"2048K"` or `"2048KB"` → 2048 × 1024 bytes
/// - `"1073741824"` → raw byte count
///
/// # Examples
/// ```
/// use memory_planner::MemoryBudget;
///
/// let b = MemoryBudget::parse("600M").unwrap();
/// assert_eq!(b.as_mb(), 600);
/// assert!(b.fits(600 * 1024 * 1024));
/// assert!(!b.fits(600 * 1024 * 1024 + 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb * MB }
    }

    pub fn from_gb(gb: usize) -> Self {
        Self { bytes: gb * GB }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Returns the budget in megabytes (truncated).
    pub fn as_mb(&self) -> usize {
        self.bytes / MB
    }

    /// Returns `true` if `bytes` does not exceed the budget.
    pub fn fits(&self, bytes: usize) -> bool {
        bytes <= self.bytes
    }

    /// Parses a human-readable budget string. Case-insensitive.
    pub fn parse(s: &str) -> Result<Self, PlanError> {
        let s = s.trim();
        let invalid = || PlanError::InvalidBudget(s.to_string());
        if s.is_empty() {
            return Err(invalid());
        }

        let upper = s.to_uppercase();
        let (digits, multiplier) = [
            ("GB", GB),
            ("G", GB),
            ("MB", MB),
            ("M", MB),
            ("KB", KB),
            ("K", KB),
            ("B", 1),
        ]
        .iter()
        .find(|(suffix, _)| upper.ends_with(suffix))
        .map(|&(suffix, m)| (&s[..s.len() - suffix.len()], m))
        .unwrap_or((s, 1));

        let value: usize = digits.trim().parse().map_err(|_| invalid())?;
        let bytes = value.checked_mul(multiplier).ok_or_else(invalid)?;
        if bytes == 0 {
            return Err(invalid());
        }
        Ok(Self { bytes })
    }
}

impl std::str::FromStr for MemoryBudget {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes >= GB && self.bytes % GB == 0 {
            write!(f, "{} GB", self.bytes / GB)
        } else if self.bytes >= MB && self.bytes % MB == 0 {
            write!(f, "{} MB", self.bytes / MB)
        } else if self.bytes >= KB && self.bytes % KB == 0 {
            write!(f, "{} KB", self.bytes / KB)
        } else {
            write!(f, "{} B", self.bytes)
        }
    }
}
