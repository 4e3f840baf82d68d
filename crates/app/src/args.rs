pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blobfs")]
#[command(about = "File operations on block-blob containers", version)]
pub struct Args {
    /// Path to a TOML engine configuration
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding container databases and payloads (defaults to ./.blobfs)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Container to operate on (defaults to the configured container)
    #[arg(long, short = 'c', global = true)]
    pub container: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: crate::Command,
}
