//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::config::ConfigCommands;
use crate::cli::commands::query::QueryArgs;

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Trellis - cached, coalesced queries against a hosted entity API", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file to load instead of .trellis/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Query records of an entity through the orchestrator
    Query(QueryArgs),

    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}
