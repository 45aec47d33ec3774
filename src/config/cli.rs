use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::color::Color;
use crate::view::{ReleasePolicy, RenderStrategy};

#[derive(Parser)]
#[command(name = "touch-grid")]
#[command(about = "Visualize per-pointer touch contact on a coarse block grid")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Surface width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Surface height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Rendering strategy (direct, composite)
    #[arg(long, env = "TOUCHGRID_STRATEGY", value_parser = clap::value_parser!(RenderStrategy))]
    pub strategy: Option<RenderStrategy>,

    /// What to do with a pointer's blocks when it lifts (keep, clear)
    #[arg(long, value_parser = clap::value_parser!(ReleasePolicy))]
    pub release_policy: Option<ReleasePolicy>,

    /// Background color (name, #RRGGBB or #AARRGGBB)
    #[arg(long, value_parser = clap::value_parser!(Color))]
    pub background: Option<Color>,

    /// Time to let the render thread catch up after each script step, in milliseconds
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Path to config file
    #[arg(long, env = "TOUCHGRID_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay a touch script and print the final frame
    Replay {
        /// Script file; reads stdin when omitted
        script: Option<PathBuf>,
    },
    /// Print the pointer color table
    Colors,
}
