// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `denoise-rt export-weights` command: write synthetic weights to disk.

use super::{banner, load_config, mb};
use crate::FilterArgs;
use runtime::{save_safetensors, synthetic_weights};
use std::path::{Path, PathBuf};
use tensor_core::DType;

pub async fn execute(config_path: Option<&Path>, args: FilterArgs, out: PathBuf, dtype: String) -> anyhow::Result<()> {
    let dtype = match dtype.to_ascii_lowercase().as_str() {
        "f16" => DType::F16,
        "f32" => DType::F32,
        other => anyhow::bail!("unsupported dtype '{other}', expected f16 or f32"),
    };
    // Only the inputs matter here.
    let mut args = args;
    if config_path.is_none() {
        args.width.get_or_insert(1);
        args.height.get_or_insert(1);
    }
    let config = load_config(config_path, &args)?;

    banner("Weight Export");
    let weights = synthetic_weights(config.inputs.channels(), dtype)?;
    save_safetensors(&weights, &out)?;

    println!("  Wrote {} tensors ({:.2} MB) to {}", weights.len(), mb(weights.total_bytes()), out.display());
    println!();
    Ok(())
}
