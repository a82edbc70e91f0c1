//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// depimg - Incremental container image builder
///
/// Decomposes a declarative build into single-purpose layers and reuses
/// previously built images from the local store.
#[derive(Parser, Debug)]
#[command(name = "depimg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Container runtime binary to drive
    #[arg(long, global = true, default_value = "docker", env = "DEPIMG_RUNTIME")]
    pub runtime: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build an image from a declaration file
    Build(BuildArgs),

    /// Write an example declaration file
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Path to the build declaration (YAML or JSON)
    #[arg(short, long)]
    pub config: PathBuf,

    /// Rebuild every layer, ignoring the checksum sidecar and reusable bases
    #[arg(long)]
    pub force_rebuild: bool,

    /// Remove the in-flight container and work directory even on failure
    #[arg(long)]
    pub clean_on_failure: bool,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Output path for the example declaration
    #[arg(short, long, default_value = "build-config.yaml")]
    pub output: PathBuf,
}
