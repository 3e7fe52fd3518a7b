//! fpmatch - Find the best match for one recording
//!
//! Usage: fpmatch [--threshold <t>] [--algorithm <id>] <file> <folder>...
//!
//! Prints the match result as JSON on stdout and the diagnostic log on
//! stderr.

use anyhow::{Context, Result};
use clap::Parser;
use riffmatch_cli::output::print_match_result;
use riffmatch_cli::sidecar::SidecarLibrary;
use riffmatch_core::{diagnostics, AlgorithmId, Engine, FileRef, RiffmatchSettings};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fpmatch")]
#[command(about = "Match a recording against labelled recordings in other folders", long_about = None)]
struct Args {
    /// Recording to identify
    file: PathBuf,

    /// Folders holding labelled recordings
    #[arg(required = true)]
    folders: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum weighted score for a match (overrides config)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Fingerprint algorithm (chroma, chroma_timeline, band_energy)
    #[arg(short, long)]
    algorithm: Option<AlgorithmId>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    riffmatch_cli::init_logging(args.verbose);

    run_fpmatch(&args)
}

fn run_fpmatch(args: &Args) -> Result<()> {
    if !args.file.exists() {
        anyhow::bail!("Input file not found: {}", args.file.display());
    }

    let settings = RiffmatchSettings::load_or_default(args.config.as_deref())?;
    let algorithm = args.algorithm.unwrap_or(settings.algorithm);
    let threshold = args.threshold.unwrap_or(settings.matching.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        anyhow::bail!("Threshold must be within [0, 1], got {}", threshold);
    }

    let library = Arc::new(SidecarLibrary::new(&settings));
    let engine = Engine::new(settings, library).context("Failed to start engine")?;

    let pool = engine.build_candidate_pool(&args.folders, algorithm)?;
    log::info!("Matching against {} labelled recordings", pool.len());

    let target = FileRef::new(&args.file);
    let (result, run_id) = engine
        .find_best_match(&target, &pool, threshold)
        .with_context(|| format!("Failed to match {}", args.file.display()))?;
    engine.cache().flush()?;

    eprint!("{}", diagnostics::render(&result));
    print_match_result(&target.path.display().to_string(), run_id, &result);

    Ok(())
}
