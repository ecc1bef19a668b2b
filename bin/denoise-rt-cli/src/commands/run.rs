// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `denoise-rt run` command: plan, build and execute the filter.
//!
//! ```text
//! load config ─► load weights ─► init (search + build) ─► execute × repeat ─► metrics
//! ```

use super::{banner, build_filter, load_config, mb, print_config};
use crate::FilterArgs;
use op_graph::{OpKind, Progress};
use std::collections::BTreeMap;
use std::path::Path;

pub async fn execute(config_path: Option<&Path>, args: FilterArgs, repeat: usize, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path, &args)?;
    if !json {
        banner("Filter Runner");
        print_config(&config);
    }

    // ── Build and execute ──────────────────────────────────────
    //
    // Planning and submission block, so both run off the async runtime.
    let (plan, metrics, hosts) = tokio::task::spawn_blocking(move || {
        let (mut filter, hosts) = build_filter(config)?;
        let plan = *filter.init()?;

        let mut last = None;
        for pass in 0..repeat.max(1) {
            let mut next_report = 0.1;
            let mut progress = Progress::with_callback(move |fraction| {
                if fraction >= next_report {
                    tracing::info!(pass, "progress {:.0}%", fraction * 100.0);
                    next_report += 0.1;
                }
                true
            });
            last = Some(filter.execute(&mut progress)?);
        }
        let metrics = last.ok_or_else(|| anyhow::anyhow!("no pass was executed"))?;
        Ok::<_, anyhow::Error>((plan, metrics, hosts))
    })
    .await??;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
        return Ok(());
    }

    println!("  Plan:    {}", plan.summary());
    println!("  Metrics: {}", metrics.summary());
    println!();

    // ── Per-engine execution trace ─────────────────────────────
    println!("  {:<8} {:>8} {:>8}  {}", "Engine", "Tiles", "Ops", "By kind");
    println!("  {}", "-".repeat(60));
    for (id, host) in hosts.iter().enumerate() {
        let trace = host.trace();
        let mut by_kind: BTreeMap<&'static str, usize> = BTreeMap::new();
        for record in &trace {
            *by_kind.entry(record.kind.as_str()).or_default() += 1;
        }
        let tiles = by_kind.get(OpKind::OutputProcess.as_str()).copied().unwrap_or(0);
        let kinds: Vec<String> = by_kind.iter().map(|(k, n)| format!("{k}={n}")).collect();
        println!("  {:<8} {:>8} {:>8}  {}", id, tiles, trace.len(), kinds.join(" "));
    }
    println!();
    println!("  Scratch + weights: {:.2} MB across {} engines", mb(plan.memory_bytes), hosts.len());
    println!();
    Ok(())
}
