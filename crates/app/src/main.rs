//! blobfs - file operations on block-blob containers
//!
//! Every command opens the selected container through the engine in
//! `common`, performs one file-system operation and prints its result.

mod args;
mod logging;
mod op;
mod ops;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{Cat, Chmod, Config, Containers, Ln, Ls, Mkdir, Mv, Put, Rm, Stat, Truncate, Version, Write};

command_enum! {
    (Ls, Ls),
    (Stat, Stat),
    (Cat, Cat),
    (Put, Put),
    (Write, Write),
    (Truncate, Truncate),
    (Mkdir, Mkdir),
    (Rm, Rm),
    (Mv, Mv),
    (Ln, Ln),
    (Chmod, Chmod),
    (Config, Config),
    (Containers, Containers),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guard = logging::init(&args.log_level);

    let build = version::build_info();
    tracing::debug!(version = build.version, profile = build.build_profile, "blobfs starting");

    let config = match op::resolve_config(args.config.as_deref(), args.data_dir, args.container) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            drop(guard);
            std::process::exit(1);
        }
    };
    let ctx = op::OpContext::new(config);

    let result = args.command.execute(&ctx).await;
    tracing::debug!(stats = ?ctx.stats.snapshot(), "engine statistics");
    drop(guard);

    match result {
        Ok(output) => {
            println!("{}", output);
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
