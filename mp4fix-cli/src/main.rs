mod error;

use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{CommandFactory, Parser};
use mimalloc::MiMalloc;
use mp4_fix::{RewriteOptions, rewrite_file};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::error::{AppError, Result};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Rewrites the AAC-LC tracks of an MP4 file to explicit SBR signalling.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    override_usage = "mp4fix [OPTIONS] INPUT OUTPUT"
)]
struct Args {
    /// Source MP4 file followed by the output path
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Warn instead of failing on chunk offset tables that cannot be
    /// patched safely
    #[arg(long)]
    allow_ambiguous_layouts: bool,
}

fn main() {
    let args = Args::parse();

    let [input, output] = args.paths.as_slice() else {
        // Wrong argument count is not an error, just a request for help.
        if let Err(e) = Args::command().print_help() {
            eprintln!("Error: {e}");
        }
        return;
    };

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Error: {e}");
        process::exit(1);
    }

    let options = RewriteOptions {
        reject_ambiguous_layouts: !args.allow_ambiguous_layouts,
    };

    if let Err(e) = run(input, output, options) {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(input: &Path, output: &Path, options: RewriteOptions) -> Result<()> {
    info!("Rewriting {} -> {}", input.display(), output.display());
    let stats = rewrite_file(input, output, options)?;
    info!("Done: {stats}");
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .try_init()
        .map_err(|e| AppError::Logging(e.to_string()))
}
