// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Filter configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! width = 1920
//! height = 1080
//! num_engines = 2
//! memory_budget = "600M"
//! weights_path = "./weights/rt_ldr.safetensors"
//!
//! [inputs]
//! color = true
//! albedo = true
//! normal = false
//!
//! [engine]
//! fused_post_ops = true
//! conv_scratch_bytes = 0
//!
//! [engine.device]
//! block_c = 16
//! tensor_layout = "Chw16c"
//! weight_layout = "OIhw16i16o"
//! dtype = "f16"
//! ```

use crate::RuntimeError;
use memory_planner::MemoryBudget;
use op_graph::host::HostEngineConfig;
use std::path::{Path, PathBuf};
use tensor_core::DType;

/// Budget per byte of element size when none is configured.
pub const DEFAULT_BUDGET_MB_PER_ELEMENT_BYTE: usize = 600;

/// Image features fed to the network, three channels each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InputFeatures {
    pub color: bool,
    pub albedo: bool,
    pub normal: bool,
}

impl Default for InputFeatures {
    fn default() -> Self {
        Self {
            color: true,
            albedo: false,
            normal: false,
        }
    }
}

impl InputFeatures {
    /// Number of network input channels.
    pub fn channels(&self) -> usize {
        3 * [self.color, self.albedo, self.normal].iter().filter(|&&on| on).count()
    }
}

/// Configuration of the denoising filter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FilterConfig {
    pub width: usize,
    pub height: usize,
    /// Number of engines; one model instance is built per engine.
    #[serde(default = "default_engines")]
    pub num_engines: usize,
    /// Memory budget (human-readable, e.g. `"600M"`). Defaults to 600 MB per
    /// byte of the device element size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_budget: Option<String>,
    /// SafeTensors weights; synthetic weights are generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights_path: Option<PathBuf>,
    /// The output image aliases the input. With more than one tile the
    /// output is staged in a temporary image in engine 0's scratch buffer,
    /// which counts against the budget.
    #[serde(default)]
    pub in_place: bool,
    #[serde(default)]
    pub inputs: InputFeatures,
    #[serde(default)]
    pub engine: HostEngineConfig,
}

fn default_engines() -> usize {
    1
}

impl FilterConfig {
    /// A configuration for a `width` x `height` color image with defaults elsewhere.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            inputs: InputFeatures::default(),
            num_engines: default_engines(),
            memory_budget: None,
            weights_path: None,
            in_place: false,
            engine: HostEngineConfig::default(),
        }
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuntimeError::Config(format!("cannot read config '{}': {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.width == 0 || self.height == 0 {
            return Err(RuntimeError::Config(format!(
                "image size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.num_engines == 0 {
            return Err(RuntimeError::Config("at least one engine is required".into()));
        }
        if self.inputs.channels() == 0 {
            return Err(RuntimeError::Config("no input features enabled".into()));
        }
        self.parse_budget()?;
        Ok(())
    }

    /// Parses the configured budget, if any.
    pub fn parse_budget(&self) -> Result<Option<MemoryBudget>, RuntimeError> {
        self.memory_budget
            .as_deref()
            .map(MemoryBudget::parse)
            .transpose()
            .map_err(|e| RuntimeError::Config(format!("invalid budget: {e}")))
    }

    /// The configured budget, or the default for elements of `dtype`.
    pub fn resolve_budget(&self, dtype: DType) -> Result<MemoryBudget, RuntimeError> {
        Ok(self
            .parse_budget()?
            .unwrap_or_else(|| MemoryBudget::from_mb(DEFAULT_BUDGET_MB_PER_ELEMENT_BYTE * dtype.size_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let c = FilterConfig::new(640, 480);
        assert_eq!(c.inputs.channels(), 3);
        assert_eq!(c.num_engines, 1);
        assert!(c.memory_budget.is_none());
        assert!(!c.in_place);
        c.validate().unwrap();
    }

    #[test]
    fn test_default_budget_scales_with_dtype() {
        let c = FilterConfig::new(64, 64);
        assert_eq!(c.resolve_budget(DType::F16).unwrap().as_mb(), 1200);
        assert_eq!(c.resolve_budget(DType::F32).unwrap().as_mb(), 2400);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
width = 1920
height = 1080
num_engines = 2
memory_budget = "256M"
in_place = true

[inputs]
albedo = true
normal = true

[engine]
fused_post_ops = false
"#;
        let c = FilterConfig::from_toml(toml).unwrap();
        assert_eq!((c.width, c.height, c.num_engines), (1920, 1080, 2));
        assert_eq!(c.inputs.channels(), 9);
        assert!(c.in_place);
        assert!(!c.engine.fused_post_ops);
        assert_eq!(c.engine.device.block_c, 16);
        assert_eq!(c.resolve_budget(DType::F16).unwrap().as_mb(), 256);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(FilterConfig::from_toml("width = 0\nheight = 10").is_err());
        assert!(FilterConfig::from_toml("width = 10\nheight = 10\nnum_engines = 0").is_err());
        assert!(FilterConfig::from_toml("width = 10\nheight = 10\nmemory_budget = \"lots\"").is_err());
        assert!(FilterConfig::from_toml("width = 10\nheight = 10\n[inputs]\ncolor = false").is_err());
        assert!(FilterConfig::from_toml("height = 10").is_err());
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut c = FilterConfig::new(800, 600);
        c.memory_budget = Some("1G".into());
        c.inputs.albedo = true;
        let back = FilterConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back.memory_budget.as_deref(), Some("1G"));
        assert_eq!(back.inputs, c.inputs);
        assert_eq!(back.engine, c.engine);
    }
}
