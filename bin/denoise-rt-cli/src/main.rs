// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # denoise-rt
//!
//! Command-line interface for the tiled denoising filter.
//!
//! ## Usage
//! ```bash
//! # Show the tiling chosen for a 4K image on two engines
//! denoise-rt plan --width 3840 --height 2160 --engines 2 --memory-budget 512M
//!
//! # Run the filter on host engines
//! denoise-rt run --width 1920 --height 1080 --albedo --normal
//!
//! # List the ops and the planned scratch layout of one model instance
//! denoise-rt inspect --width 1920 --height 1080
//!
//! # Write synthetic weights to a SafeTensors file
//! denoise-rt export-weights --out unet.safetensors
//! ```

mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "denoise-rt",
    about = "Tiled U-Net denoising filter with planned scratch memory",
    version,
    author
)]
struct Cli {
    /// Path to a TOML filter configuration; command-line options override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Filter options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Image width in pixels.
    #[arg(long)]
    pub width: Option<usize>,

    /// Image height in pixels.
    #[arg(long)]
    pub height: Option<usize>,

    /// Number of engines (one model instance each).
    #[arg(short, long)]
    pub engines: Option<usize>,

    /// Memory budget for all instances (e.g., "512M", "2G").
    #[arg(short = 'b', long)]
    pub memory_budget: Option<String>,

    /// SafeTensors weights; synthetic weights are used when absent.
    #[arg(short, long)]
    pub weights: Option<PathBuf>,

    /// Add an albedo input.
    #[arg(long)]
    pub albedo: bool,

    /// Add a normal input.
    #[arg(long)]
    pub normal: bool,

    /// Write the output over the input image.
    #[arg(long)]
    pub in_place: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for a tiling and print it.
    Plan {
        #[command(flatten)]
        filter: FilterArgs,

        /// Print the plan and its tile regions as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Plan, build and run the filter on host engines.
    Run {
        #[command(flatten)]
        filter: FilterArgs,

        /// Number of times to run the whole image.
        #[arg(long, default_value_t = 1)]
        repeat: usize,

        /// Print the metrics of the last run as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show the ops and scratch layout of one model instance.
    Inspect {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write synthetic weights for the configured inputs to a SafeTensors file.
    ExportWeights {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file.
        #[arg(short, long)]
        out: PathBuf,

        /// Stored precision: f16 or f32.
        #[arg(long, default_value = "f16")]
        dtype: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Plan { filter, json } => commands::plan::execute(config, filter, json).await,
        Commands::Run { filter, repeat, json } => commands::run::execute(config, filter, repeat, json).await,
        Commands::Inspect { filter } => commands::inspect::execute(config, filter).await,
        Commands::ExportWeights { filter, out, dtype } => {
            commands::export::execute(config, filter, out, dtype).await
        }
    }
}
