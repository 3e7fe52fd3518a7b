//! autolabel - Name unlabelled recordings after their best match
//!
//! Usage: autolabel [--candidates <folder>...] [--dry-run] [--overwrite] <folder>...
//!
//! Every recording in the target folders is matched against the labelled
//! recordings of the candidate folders (the target folders themselves when
//! none are given). Winning names are written to the sidecar names file.

use anyhow::{Context, Result};
use clap::Parser;
use riffmatch_cli::output::print_batch_report;
use riffmatch_cli::sidecar::SidecarLibrary;
use riffmatch_core::{
    AlgorithmId, AutoLabelOptions, CancellationToken, Engine, FolderManager, RiffmatchSettings,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "autolabel")]
#[command(about = "Auto-label recordings from their best cross-folder match", long_about = None)]
struct Args {
    /// Folders whose recordings should be labelled
    #[arg(required = true)]
    folders: Vec<PathBuf>,

    /// Folders holding labelled recordings (defaults to the target folders)
    #[arg(long, num_args = 1..)]
    candidates: Vec<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum weighted score for a match (overrides config)
    #[arg(short, long)]
    threshold: Option<f32>,

    /// Fingerprint algorithm (chroma, chroma_timeline, band_energy)
    #[arg(short, long)]
    algorithm: Option<AlgorithmId>,

    /// Report matches without writing names
    #[arg(long)]
    dry_run: bool,

    /// Replace names that are already set
    #[arg(long)]
    overwrite: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    riffmatch_cli::init_logging(args.verbose);

    run_autolabel(&args)
}

fn run_autolabel(args: &Args) -> Result<()> {
    let settings = RiffmatchSettings::load_or_default(args.config.as_deref())?;
    let options = AutoLabelOptions {
        threshold: args.threshold.unwrap_or(settings.matching.threshold),
        algorithm: args.algorithm.unwrap_or(settings.algorithm),
        overwrite_existing: args.overwrite,
        dry_run: args.dry_run,
    };
    if !(0.0..=1.0).contains(&options.threshold) {
        anyhow::bail!("Threshold must be within [0, 1], got {}", options.threshold);
    }

    let library = Arc::new(SidecarLibrary::new(&settings));
    let engine = Engine::new(settings, library.clone()).context("Failed to start engine")?;

    let mut targets = library.list_candidate_files(&args.folders)?;
    if !args.overwrite {
        let mut unlabelled = Vec::with_capacity(targets.len());
        for file in targets {
            if library.provided_name(&file)?.is_none() {
                unlabelled.push(file);
            }
        }
        targets = unlabelled;
    }
    log::info!("{} recordings to label", targets.len());

    let candidate_folders = if args.candidates.is_empty() {
        &args.folders
    } else {
        &args.candidates
    };

    let start = std::time::Instant::now();
    let report = engine.auto_label_batch(
        &targets,
        candidate_folders,
        &options,
        &|p| log::info!("[{}/{}] {}", p.completed, p.total, p.file.path.display()),
        &CancellationToken::new(),
    )?;

    print_batch_report(&report, args.dry_run, start.elapsed().as_secs_f64());
    Ok(())
}
