// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `denoise-rt inspect` command: display the network and its scratch layout.
//!
//! Plans the tiling, then declares one model instance at the chosen tile
//! size without finalizing it, so the allocation records are still there.

use super::{banner, load_config, load_weights, mb};
use crate::FilterArgs;
use op_graph::{Engine, Graph};
use runtime::model::{build_unet, conv_layers};
use runtime::{host_engines, DenoiseFilter};
use std::path::Path;
use std::sync::Arc;

pub async fn execute(config_path: Option<&Path>, args: FilterArgs) -> anyhow::Result<()> {
    let config = load_config(config_path, &args)?;
    let input_channels = config.inputs.channels();

    let (plan, mut graph) = tokio::task::spawn_blocking(move || {
        let weights = Arc::new(load_weights(&config)?);
        let engines: Vec<Arc<dyn Engine>> = host_engines(&config)?
            .into_iter()
            .map(|h| h as Arc<dyn Engine>)
            .collect();
        let first = engines.first().cloned().ok_or_else(|| anyhow::anyhow!("no engines configured"))?;
        let mut filter = DenoiseFilter::new(engines, weights.clone(), config)?;
        let plan = *filter.init()?;

        let mut graph = Graph::new(first, weights);
        build_unet(&mut graph, input_channels, plan.tile_h, plan.tile_w)?;
        Ok::<_, anyhow::Error>((plan, graph))
    })
    .await??;
    let layout = graph.planned_layout()?;

    banner("Model Inspector");
    println!("  Plan:  {}", plan.summary());
    println!("  Graph: {}", graph.summary());
    println!();

    // ── Convolutions ───────────────────────────────────────────
    println!("  {:<14} {:>6} {:>6}", "Conv", "In", "Out");
    println!("  {}", "-".repeat(28));
    for layer in conv_layers(input_channels) {
        println!("  {:<14} {:>6} {:>6}", layer.name, layer.in_channels, layer.out_channels);
    }
    println!();

    // ── Scratch layout ─────────────────────────────────────────
    let stats = graph.plan_stats();
    println!("  {}", stats.summary());
    println!();
    println!(
        "  {:<4} {:<18} {:<20} {:>12} {:>10} {:>9}",
        "Idx", "Producer", "Kind", "Offset", "Size", "Live"
    );
    println!("  {}", "-".repeat(80));
    let kinds: Vec<_> = graph.ops().map(|(kind, _)| kind).collect();
    for (i, t) in layout.iter().enumerate() {
        println!(
            "  {:<4} {:<18} {:<20} {:>12} {:>7.2} MB {:>4}-{:<4}",
            i,
            t.producer,
            kinds[t.first_op].as_str(),
            t.byte_offset,
            mb(t.byte_size),
            t.first_op,
            t.last_op,
        );
    }
    println!();
    println!(
        "  Scratch: {:.2} MB   Weights: {:.2} MB",
        mb(graph.scratch_byte_size()?),
        mb(graph.private_byte_size()),
    );
    println!();
    Ok(())
}
