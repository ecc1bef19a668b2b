// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! End-to-end tests: configure, load weights, plan, build and run the filter
//! on host engines.

use op_graph::host::HostEngine;
use op_graph::{Engine, OpKind, Progress, WeightMap};
use runtime::{
    host_engines, save_safetensors, synthetic_weights, DenoiseFilter, FilterConfig, RuntimeError, WeightLoader,
};
use std::sync::Arc;
use tensor_core::DType;

// ── Helpers ────────────────────────────────────────────────────

/// Ops per tile with fused post-ops: input, 16 convolutions, output.
const OPS_PER_TILE: usize = 18;

fn build(config: FilterConfig, weights: WeightMap) -> (DenoiseFilter, Vec<Arc<HostEngine>>) {
    let hosts = host_engines(&config).unwrap();
    let engines: Vec<Arc<dyn Engine>> = hosts.iter().map(|h| h.clone() as Arc<dyn Engine>).collect();
    (DenoiseFilter::new(engines, Arc::new(weights), config).unwrap(), hosts)
}

fn filter(config: FilterConfig) -> (DenoiseFilter, Vec<Arc<HostEngine>>) {
    let weights = synthetic_weights(config.inputs.channels(), DType::F16).unwrap();
    build(config, weights)
}

/// A two-engine filter on a 512x512 image, squeezed into several tiles.
fn tiled_config() -> FilterConfig {
    let mut config = FilterConfig::new(512, 512);
    config.num_engines = 2;
    let (mut f, _) = filter(config.clone());
    let ample = f.init().unwrap().memory_bytes;
    config.memory_budget = Some(format!("{}B", ample / 4));
    config
}

// ── Full Pipeline Tests ────────────────────────────────────────

#[tokio::test]
async fn test_end_to_end_round_robin() {
    let (mut f, hosts) = filter(tiled_config());
    let plan = *f.init().unwrap();
    assert!(plan.num_tiles() > 2);
    assert_eq!(plan.num_tiles() % 2, 0);

    let metrics = tokio::task::spawn_blocking(move || f.execute(&mut Progress::new()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(metrics.tiles_submitted, plan.num_tiles());
    assert_eq!(metrics.ops_per_tile, OPS_PER_TILE);
    assert_eq!(metrics.tiles_per_engine, vec![plan.num_tiles() / 2; 2]);

    for (id, host) in hosts.iter().enumerate() {
        let trace = host.trace();
        assert_eq!(trace.len(), plan.num_tiles() / 2 * OPS_PER_TILE);
        assert!(trace.iter().all(|r| r.engine == id));
        assert!(trace.iter().all(|r| r.tile.is_some_and(|t| t % 2 == id)));
        // Each tile starts with its input and ends with its output.
        assert_eq!(trace[0].kind, OpKind::InputProcess);
        assert_eq!(trace[OPS_PER_TILE - 1].kind, OpKind::OutputProcess);
    }
}

#[tokio::test]
async fn test_progress_reaches_completion() {
    let (mut f, _) = filter(FilterConfig::new(160, 96));
    f.init().unwrap();

    let (mut progress, seen) = {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let p = Progress::with_callback(move |fraction| {
            sink.lock().unwrap().push(fraction);
            true
        });
        (p, seen)
    };
    let metrics = tokio::task::spawn_blocking(move || {
        let m = f.execute(&mut progress);
        (m, progress)
    })
    .await
    .unwrap();

    let (metrics, progress) = metrics;
    let metrics = metrics.unwrap();
    assert_eq!(progress.done(), metrics.total_tiles * OPS_PER_TILE);
    assert_eq!(progress.fraction(), 1.0);
    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_cancellation_drains_engines() {
    let (mut f, hosts) = filter(tiled_config());
    let plan = *f.init().unwrap();
    let total_ops = plan.num_tiles() * OPS_PER_TILE;

    let result = tokio::task::spawn_blocking(move || {
        let mut progress = Progress::with_callback(|fraction| fraction < 0.25);
        f.execute(&mut progress)
    })
    .await
    .unwrap();

    match result {
        Err(RuntimeError::Cancelled {
            completed_tiles,
            total_tiles,
        }) => {
            assert_eq!(total_tiles, plan.num_tiles());
            assert!(completed_tiles < total_tiles);
        }
        other => panic!("expected cancellation, got {other:?}"),
    }

    // Engines were waited, so the traces are complete and short of the total.
    let executed: usize = hosts.iter().map(|h| h.trace().len()).sum();
    assert!(executed > 0);
    assert!(executed < total_ops);
}

#[test]
fn test_execute_twice_reuses_graphs() {
    let (mut f, hosts) = filter(FilterConfig::new(128, 128));
    f.init().unwrap();
    f.execute(&mut Progress::new()).unwrap();
    hosts[0].clear_trace();
    let metrics = f.execute(&mut Progress::new()).unwrap();
    assert_eq!(hosts[0].trace().len(), metrics.total_tiles * OPS_PER_TILE);
}

// ── Configuration and Weights ──────────────────────────────────

#[test]
fn test_config_file_drives_filter() {
    let toml_str = r#"
        width = 256
        height = 192
        num_engines = 2
        memory_budget = "2GB"

        [inputs]
        albedo = true
        normal = true
    "#;
    let config = FilterConfig::from_toml(toml_str).unwrap();
    assert_eq!(config.inputs.channels(), 9);

    let (mut f, _) = filter(config.clone());
    let plan = *f.init().unwrap();
    assert_eq!(plan.num_engines, 2);
    assert!(plan.memory_bytes <= 2 * 1024 * 1024 * 1024);

    let back = FilterConfig::from_toml(&config.to_toml().unwrap()).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_weights_from_safetensors_file() {
    let dir = std::env::temp_dir().join("denoise_rt_integration");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("unet_rt.safetensors");
    save_safetensors(&synthetic_weights(3, DType::F32).unwrap(), &path).unwrap();

    let mut config = FilterConfig::new(96, 96);
    config.weights_path = Some(path.clone());
    let loader = WeightLoader::from_config_path(config.weights_path.as_deref()).unwrap();
    assert!(loader.is_file_backed());
    let weights = loader.load(config.inputs.channels(), DType::F16).unwrap();

    // f32 weights are reordered into the f16 device layout at finalize.
    let (mut f, _) = build(config, weights);
    f.init().unwrap();
    f.execute(&mut Progress::new()).unwrap();
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_weights_for_wrong_inputs_fail() {
    let mut config = FilterConfig::new(96, 96);
    config.inputs.albedo = true;
    // Weights for color only: enc_conv0 expects 3 input channels, not 6.
    let (mut f, _) = build(config, synthetic_weights(3, DType::F16).unwrap());
    // Build errors surface through the tiling search.
    assert!(matches!(f.init(), Err(RuntimeError::Tiling(_))));
    assert!(f.plan().is_none());
}
