//! fpgen - Fingerprint generator
//!
//! Usage: fpgen [--config <path>] [--algorithm <id>] <folder>...
//!
//! Fingerprints every audio file in the given practice folders and stores
//! the results in each folder's cache.

use anyhow::{Context, Result};
use clap::Parser;
use riffmatch_cli::output::print_json;
use riffmatch_cli::sidecar::SidecarLibrary;
use riffmatch_core::{AlgorithmId, CancellationToken, Engine, FolderManager, RiffmatchSettings};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fpgen")]
#[command(about = "Generate and cache fingerprints for practice folders", long_about = None)]
struct Args {
    /// Practice folders to fingerprint
    #[arg(required = true)]
    folders: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fingerprint algorithm (chroma, chroma_timeline, band_energy)
    #[arg(short, long)]
    algorithm: Option<AlgorithmId>,

    /// Drop cached fingerprints of deleted files first
    #[arg(long)]
    prune: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    riffmatch_cli::init_logging(args.verbose);

    run_fpgen(&args)
}

fn run_fpgen(args: &Args) -> Result<()> {
    let settings = RiffmatchSettings::load_or_default(args.config.as_deref())?;
    let algorithm = args.algorithm.unwrap_or(settings.algorithm);

    let library = Arc::new(SidecarLibrary::new(&settings));
    let engine = Engine::new(settings, library.clone()).context("Failed to start engine")?;

    let mut pruned = 0;
    if args.prune {
        for folder in &args.folders {
            pruned += engine.prune_cache(folder)?;
        }
    }

    let files = library.list_candidate_files(&args.folders)?;
    log::info!("Fingerprinting {} files with {}", files.len(), algorithm);

    let start = std::time::Instant::now();
    let report = engine.generate_fingerprints(
        &files,
        algorithm,
        &|p| log::info!("[{}/{}] {}", p.completed, p.total, p.file.path.display()),
        &CancellationToken::new(),
    )?;
    let elapsed = start.elapsed();

    let failed: Vec<_> = report
        .failed
        .iter()
        .map(|(file, error)| {
            serde_json::json!({
                "file": file.path.display().to_string(),
                "error": error,
            })
        })
        .collect();

    print_json(&serde_json::json!({
        "status": "success",
        "algorithm": algorithm,
        "folders": args.folders,
        "num_files": files.len(),
        "fingerprinted": report.fingerprinted,
        "failed": failed,
        "pruned": pruned,
        "processing_time_seconds": elapsed.as_secs_f64(),
    }));

    Ok(())
}
