// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `denoise-rt plan` command: search for a tiling and print it.
//!
//! The search builds real graphs on host engines, so the estimates are the
//! ones `run` would use.

use super::{banner, build_filter, load_config, mb, print_config};
use crate::FilterArgs;
use std::path::Path;

pub async fn execute(config_path: Option<&Path>, args: FilterArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, &args)?;

    let build_config = config.clone();
    let plan = tokio::task::spawn_blocking(move || {
        let (mut filter, _) = build_filter(build_config)?;
        let plan = *filter.init()?;
        Ok::<_, anyhow::Error>(plan)
    })
    .await??;

    if json {
        let regions: Vec<_> = plan.regions().collect();
        let out = serde_json::json!({ "plan": plan, "regions": regions });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    banner("Tiling Planner");
    print_config(&config);
    println!("  Plan: {}", plan.summary());
    println!();
    println!(
        "   Tile:        {}x{} (overlap {}, alignment {})",
        plan.tile_w, plan.tile_h, plan.overlap, plan.alignment
    );
    println!("   Grid:        {} x {} = {} tiles", plan.count_w, plan.count_h, plan.num_tiles());
    println!("   Memory:      {:.2} MB for {} instances", mb(plan.memory_bytes), plan.num_engines);
    println!("   Attempts:    {}", plan.attempts);
    if plan.unconstrained {
        println!("   Warning:     no tiling fits the budget; built without one");
    }
    println!();

    println!("  {:<6} {:<8} {:<22} {:<22}", "Tile", "Engine", "Input (x,y wxh)", "Output (x,y wxh)");
    println!("  {}", "-".repeat(60));
    for r in plan.regions() {
        println!(
            "  {:<6} {:<8} {:<22} {:<22}",
            r.index,
            r.engine,
            format!("{},{} {}x{}", r.input.image_x, r.input.image_y, r.input.width, r.input.height),
            format!("{},{} {}x{}", r.output.image_x, r.output.image_y, r.output.width, r.output.height),
        );
    }
    println!();
    Ok(())
}
