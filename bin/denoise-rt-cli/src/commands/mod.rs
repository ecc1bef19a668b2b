// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the helpers they share.

pub mod export;
pub mod inspect;
pub mod plan;
pub mod run;

use crate::FilterArgs;
use anyhow::Context;
use op_graph::host::HostEngine;
use op_graph::{Engine, WeightMap};
use runtime::{host_engines, DenoiseFilter, FilterConfig, WeightLoader};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs the log subscriber. `RUST_LOG` wins over the verbosity flag.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose >= 3)
        .init();
}

/// Merges the optional TOML file with the command-line options.
pub fn load_config(path: Option<&Path>, args: &FilterArgs) -> anyhow::Result<FilterConfig> {
    let mut config = match path {
        Some(p) => FilterConfig::from_file(p).with_context(|| format!("loading {}", p.display()))?,
        None => {
            let (Some(width), Some(height)) = (args.width, args.height) else {
                anyhow::bail!("--width and --height are required without --config");
            };
            FilterConfig::new(width, height)
        }
    };

    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(engines) = args.engines {
        config.num_engines = engines;
    }
    if let Some(budget) = &args.memory_budget {
        config.memory_budget = Some(budget.clone());
    }
    if let Some(weights) = &args.weights {
        config.weights_path = Some(weights.clone());
    }
    config.inputs.albedo |= args.albedo;
    config.inputs.normal |= args.normal;
    config.in_place |= args.in_place;

    config.validate()?;
    Ok(config)
}

/// Loads the configured weights in the device precision.
pub fn load_weights(config: &FilterConfig) -> anyhow::Result<WeightMap> {
    let loader = WeightLoader::from_config_path(config.weights_path.as_deref())?;
    let weights = loader.load(config.inputs.channels(), config.engine.device.dtype)?;
    Ok(weights)
}

/// Starts the host engines and creates an uninitialized filter on them.
pub fn build_filter(config: FilterConfig) -> anyhow::Result<(DenoiseFilter, Vec<Arc<HostEngine>>)> {
    let weights = Arc::new(load_weights(&config)?);
    let hosts = host_engines(&config)?;
    let engines: Vec<Arc<dyn Engine>> = hosts.iter().map(|h| h.clone() as Arc<dyn Engine>).collect();
    let filter = DenoiseFilter::new(engines, weights, config)?;
    Ok((filter, hosts))
}

pub fn mb(bytes: usize) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// Prints the box-drawn command banner.
pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║{:^54}║", format!("denoise-rt · {title}"));
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

pub fn print_config(config: &FilterConfig) {
    println!("  Config:");
    println!("   Image:    {}x{}", config.width, config.height);
    println!("   Inputs:   {} channels", config.inputs.channels());
    println!("   Engines:  {}", config.num_engines);
    println!("   In place: {}", config.in_place);
    println!(
        "   Budget:   {}",
        config.memory_budget.as_deref().unwrap_or("default (600 MB per element byte)")
    );
    println!(
        "   Weights:  {}",
        config
            .weights_path
            .as_deref()
            .map_or_else(|| "<synthetic>".to_string(), |p| p.display().to_string())
    );
    println!();
}
