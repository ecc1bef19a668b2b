// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight loading from SafeTensors files with memory-mapped I/O.
//!
//! [`WeightLoader`] provides two modes:
//!
//! 1. **File-backed**: maps a `.safetensors` file and copies every tensor
//!    into a [`WeightMap`]. Convolution weights must be rank 4 (`oihw`),
//!    biases rank 1; both in `f16` or `f32`.
//! 2. **Synthetic**: generates deterministic weights for the U-Net channel
//!    table, for planning and testing without trained weights.
//!
//! Weights are kept in their stored layout; graphs reorder them into the
//! device layout when they are finalized.

use crate::model::conv_layers;
use crate::RuntimeError;
use op_graph::WeightMap;
use safetensors::{Dtype, SafeTensors};
use std::path::{Path, PathBuf};
use tensor_core::{DType, Tensor, TensorDesc, TensorDims, TensorLayout};
use tracing::{info, warn};

/// Loads network weights into a [`WeightMap`].
pub struct WeightLoader {
    path: Option<PathBuf>,
    /// Memory-mapped SafeTensors file (opened once, reused).
    mmap: Option<memmap2::Mmap>,
}

impl WeightLoader {
    /// Opens and maps a SafeTensors file.
    pub fn open(path: &Path) -> Result<Self, RuntimeError> {
        let file = std::fs::File::open(path).map_err(|e| load_error(path, format!("cannot open: {e}")))?;
        // SAFETY: the map is read-only and the file is not expected to change
        // while the loader exists.
        let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| load_error(path, format!("mmap failed: {e}")))?;
        info!(
            "weight loader: mmap'd {} ({:.2} MB)",
            path.display(),
            mmap.len() as f64 / (1024.0 * 1024.0),
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            mmap: Some(mmap),
        })
    }

    /// Creates a loader in synthetic mode (no file needed).
    pub fn synthetic() -> Self {
        Self { path: None, mmap: None }
    }

    /// Opens `path` if given, otherwise falls back to synthetic mode.
    pub fn from_config_path(path: Option<&Path>) -> Result<Self, RuntimeError> {
        match path {
            Some(p) => Self::open(p),
            None => {
                warn!("weight loader: no weights file configured, using synthetic weights");
                Ok(Self::synthetic())
            }
        }
    }

    pub fn is_file_backed(&self) -> bool {
        self.mmap.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Loads every tensor of the file, or synthesizes the U-Net weights for
    /// `input_channels` in `dtype`.
    pub fn load(&self, input_channels: usize, dtype: DType) -> Result<WeightMap, RuntimeError> {
        match &self.mmap {
            Some(mmap) => self.load_from_safetensors(mmap),
            None => synthetic_weights(input_channels, dtype),
        }
    }

    // ── Private helpers ────────────────────────────────────────

    fn load_from_safetensors(&self, mmap: &memmap2::Mmap) -> Result<WeightMap, RuntimeError> {
        let path = self.path.as_deref().unwrap_or(Path::new("<memory>"));
        let st = SafeTensors::deserialize(mmap).map_err(|e| load_error(path, format!("SafeTensors parse error: {e}")))?;

        let mut map = WeightMap::new();
        for (name, view) in st.tensors() {
            let invalid = |detail: String| RuntimeError::WeightLoad {
                name: name.clone(),
                detail,
            };
            let dtype = convert_safetensor_dtype(view.dtype()).map_err(invalid)?;
            let shape = view.shape();
            let (dims, layout) = match *shape {
                [o, i, h, w] => (TensorDims::oihw(o, i, h, w), TensorLayout::Oihw),
                [x] => (TensorDims::x(x), TensorLayout::X),
                _ => return Err(invalid(format!("unsupported rank {} (shape {shape:?})", shape.len()))),
            };
            let desc = TensorDesc::dense(dims, layout, dtype).map_err(|e| invalid(e.to_string()))?;
            let tensor = Tensor::from_bytes(desc, view.data().to_vec()).map_err(|e| invalid(e.to_string()))?;
            map.insert(name, tensor);
        }

        info!(tensors = map.len(), bytes = map.total_bytes(), "loaded weights");
        Ok(map)
    }
}

impl std::fmt::Debug for WeightLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightLoader")
            .field("path", &self.path)
            .field("file_backed", &self.is_file_backed())
            .finish()
    }
}

/// Deterministic weights for every convolution of the network.
///
/// Values are small and vary per element so that reorder mistakes are
/// visible; they are not meant to denoise anything.
pub fn synthetic_weights(input_channels: usize, dtype: DType) -> Result<WeightMap, RuntimeError> {
    let mut map = WeightMap::new();
    for (n, layer) in conv_layers(input_channels).into_iter().enumerate() {
        let weight_desc = TensorDesc::dense(
            TensorDims::oihw(layer.out_channels, layer.in_channels, 3, 3),
            TensorLayout::Oihw,
            dtype,
        )
        .map_err(|e| synthetic_error(layer.name, e))?;
        let values: Vec<f32> = (0..weight_desc.num_elements()).map(|i| pseudo_random(n, i)).collect();
        let weight = Tensor::from_f32(weight_desc, &values).map_err(|e| synthetic_error(layer.name, e))?;

        let bias_desc = TensorDesc::dense(TensorDims::x(layer.out_channels), TensorLayout::X, dtype)
            .map_err(|e| synthetic_error(layer.name, e))?;
        let values: Vec<f32> = (0..layer.out_channels).map(|i| pseudo_random(n + 100, i) * 0.1).collect();
        let bias = Tensor::from_f32(bias_desc, &values).map_err(|e| synthetic_error(layer.name, e))?;

        map.insert(format!("{}.weight", layer.name), weight);
        map.insert(format!("{}.bias", layer.name), bias);
    }
    Ok(map)
}

/// Writes a weight map as a SafeTensors file.
pub fn save_safetensors(weights: &WeightMap, path: &Path) -> Result<(), RuntimeError> {
    let entries: Vec<(String, Dtype, Vec<usize>, Vec<u8>)> = weights
        .iter()
        .map(|(name, t)| {
            let dtype = match t.dtype() {
                DType::F32 => Dtype::F32,
                DType::F16 => Dtype::F16,
            };
            let bytes = t.map_read().bytes().to_vec();
            (name.to_string(), dtype, t.desc().dims().as_slice().to_vec(), bytes)
        })
        .collect();

    let views = entries
        .iter()
        .map(|(name, dtype, shape, bytes)| {
            safetensors::tensor::TensorView::new(*dtype, shape.clone(), bytes)
                .map(|view| (name.as_str(), view))
                .map_err(|e| RuntimeError::WeightLoad {
                    name: name.clone(),
                    detail: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let data = safetensors::serialize(views, &None).map_err(|e| load_error(path, format!("serialise failed: {e}")))?;
    std::fs::write(path, data).map_err(|e| load_error(path, format!("cannot write: {e}")))
}

fn convert_safetensor_dtype(st_dtype: Dtype) -> Result<DType, String> {
    match st_dtype {
        Dtype::F32 => Ok(DType::F32),
        Dtype::F16 => Ok(DType::F16),
        other => Err(format!("unsupported dtype {other:?}")),
    }
}

/// Value in `[-0.5, 0.5)` from a multiplicative hash.
fn pseudo_random(layer: usize, index: usize) -> f32 {
    let h = (index as u64 ^ ((layer as u64) << 32)).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ((h >> 40) as f32 / (1u64 << 24) as f32) - 0.5
}

fn load_error(path: &Path, detail: String) -> RuntimeError {
    RuntimeError::WeightLoad {
        name: path.display().to_string(),
        detail,
    }
}

fn synthetic_error(layer: &str, e: tensor_core::TensorError) -> RuntimeError {
    RuntimeError::WeightLoad {
        name: layer.to_string(),
        detail: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("denoise_rt_weight_tests");
        std::fs::create_dir_all(&dir).ok();
        dir.join(name)
    }

    #[test]
    fn test_synthetic_mode() {
        let loader = WeightLoader::synthetic();
        assert!(!loader.is_file_backed());
        let map = loader.load(3, DType::F16).unwrap();
        assert_eq!(map.len(), 32);

        let w = map.get("enc_conv0.weight").unwrap();
        assert_eq!(w.desc().dims(), &TensorDims::oihw(32, 3, 3, 3));
        assert_eq!(w.dtype(), DType::F16);
        assert_eq!(map.get("dec_conv0.bias").unwrap().desc().x(), 3);
    }

    #[test]
    fn test_synthetic_is_deterministic() {
        let a = synthetic_weights(6, DType::F32).unwrap();
        let b = synthetic_weights(6, DType::F32).unwrap();
        let key = "dec_conv1a.weight";
        assert_eq!(a.get(key).unwrap().to_f32_vec(), b.get(key).unwrap().to_f32_vec());
        assert!(a.get(key).unwrap().to_f32_vec().iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_safetensors_roundtrip() {
        let path = temp_path("roundtrip.safetensors");
        let weights = synthetic_weights(3, DType::F16).unwrap();
        save_safetensors(&weights, &path).unwrap();

        let loader = WeightLoader::open(&path).unwrap();
        assert!(loader.is_file_backed());
        let loaded = loader.load(3, DType::F16).unwrap();
        assert_eq!(loaded.len(), weights.len());
        for (name, t) in weights.iter() {
            let l = loaded.get(name).unwrap();
            assert_eq!(l.desc(), t.desc(), "{name}");
            assert_eq!(l.to_f32_vec(), t.to_f32_vec(), "{name}");
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file() {
        let r = WeightLoader::open(&temp_path("does_not_exist.safetensors"));
        assert!(matches!(r, Err(RuntimeError::WeightLoad { .. })));
    }

    #[test]
    fn test_corrupt_file() {
        let path = temp_path("corrupt.safetensors");
        std::fs::write(&path, b"not a safetensors file").unwrap();
        let loader = WeightLoader::open(&path).unwrap();
        assert!(loader.load(3, DType::F16).is_err());
        std::fs::remove_file(&path).ok();
    }
}
