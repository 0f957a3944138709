//! CLI module for the resumable batch runner.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::OutputFormat;

/// Run per-row LLM prompts over a dataset with checkpointing and resume.
#[derive(Debug, Parser)]
#[command(name = "rebatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'c', global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        short = 'f',
        global = true,
        help = "Output format: text, json, or markdown"
    )]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process every pending dataset row, resuming from earlier output
    Run(commands::RunArgs),

    /// Show progress of an output directory
    Status(commands::StatusArgs),

    /// Combine stored results into one file sorted by row
    Export(commands::ExportArgs),

    /// Run an extractor over raw responses or stored records
    Extract(commands::ExtractArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),
}
