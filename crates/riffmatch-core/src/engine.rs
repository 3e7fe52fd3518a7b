//! Engine facade for the UI/controller layer
//!
//! Owns the long-lived pieces (settings, cache, extractor, worker pool,
//! diagnostics history) and exposes the batch operations. All CPU work runs
//! on the engine's rayon pool, never on the caller's thread pool.

use crate::audio::{FileSignalLoader, SignalLoader};
use crate::autolabel::{
    AutoLabelController, AutoLabelOptions, BatchReport, CancellationToken, CandidatePool,
    FingerprintProvider, Progress, ProgressCounter,
};
use crate::cache::FingerprintCache;
use crate::diagnostics::{self, DiagnosticsStore};
use crate::error::EngineError;
use crate::extractor::FingerprintExtractor;
use crate::fingerprint::Fingerprint;
use crate::library::{FileRef, FolderManager};
use crate::matching::{CrossFolderMatcher, MatchResult, ReferenceIndex};
use crate::settings::RiffmatchSettings;
use rayon::prelude::*;
use riffmatch_fp::AlgorithmId;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Summary of a fingerprint generation batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateReport {
    /// Files that now have a current fingerprint
    pub fingerprinted: usize,
    /// Files that could not be analysed, with the reason
    pub failed: Vec<(FileRef, String)>,
    pub cancelled: bool,
}

/// Fingerprinting and matching engine
pub struct Engine {
    settings: RiffmatchSettings,
    loader: Box<dyn SignalLoader>,
    library: Arc<dyn FolderManager>,
    extractor: FingerprintExtractor,
    matcher: CrossFolderMatcher,
    cache: FingerprintCache,
    diagnostics: DiagnosticsStore,
    pool: rayon::ThreadPool,
}

impl Engine {
    /// Build an engine that decodes audio from disk
    pub fn new(settings: RiffmatchSettings, library: Arc<dyn FolderManager>) -> Result<Self, EngineError> {
        let loader = FileSignalLoader::new(settings.analysis.sample_rate);
        Self::with_loader(settings, library, Box::new(loader))
    }

    /// Build an engine around a custom signal loader
    pub fn with_loader(
        settings: RiffmatchSettings,
        library: Arc<dyn FolderManager>,
        loader: Box<dyn SignalLoader>,
    ) -> Result<Self, EngineError> {
        settings
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let pool = settings
            .workers
            .build_pool()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        log::info!(
            "Engine ready: algorithm {}, {} worker threads",
            settings.algorithm,
            pool.current_num_threads()
        );

        Ok(Self {
            extractor: FingerprintExtractor::new(&settings.analysis),
            matcher: CrossFolderMatcher::new(&settings.matching),
            cache: FingerprintCache::new(settings.cache.clone()),
            diagnostics: DiagnosticsStore::default(),
            settings,
            loader,
            library,
            pool,
        })
    }

    pub fn settings(&self) -> &RiffmatchSettings {
        &self.settings
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    fn provider(&self) -> FingerprintProvider<'_> {
        FingerprintProvider {
            loader: self.loader.as_ref(),
            extractor: &self.extractor,
            cache: &self.cache,
        }
    }

    fn references(&self) -> Result<ReferenceIndex, EngineError> {
        let marks = self
            .library
            .reference_folder_marks()
            .map_err(EngineError::Library)?;
        Ok(ReferenceIndex::new(&marks))
    }

    /// Fingerprint of a single file, from cache or freshly extracted
    pub fn fingerprint(&self, file: &FileRef, algorithm: AlgorithmId) -> Result<Fingerprint, EngineError> {
        let provider = self.provider();
        self.pool.install(|| provider.ensure(file, algorithm))
    }

    /// Make sure every file has a current fingerprint, then persist the cache
    pub fn generate_fingerprints(
        &self,
        files: &[FileRef],
        algorithm: AlgorithmId,
        progress: &(dyn Fn(Progress) + Sync),
        cancel: &CancellationToken,
    ) -> Result<GenerateReport, EngineError> {
        let provider = self.provider();
        let counter = ProgressCounter::new(files.len(), progress);

        let results: Vec<Option<Result<(), (FileRef, String)>>> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let result = provider.ensure(file, algorithm).map(|_| ()).map_err(|e| {
                        log::warn!("Could not analyze {}: {}", file.path.display(), e);
                        (file.clone(), e.to_string())
                    });
                    counter.advance(file);
                    Some(result)
                })
                .collect()
        });

        let mut report = GenerateReport::default();
        for result in results {
            match result {
                Some(Ok(())) => report.fingerprinted += 1,
                Some(Err(failure)) => report.failed.push(failure),
                None => report.cancelled = true,
            }
        }

        self.cache.flush()?;
        log::info!(
            "Fingerprinted {} files ({} failed)",
            report.fingerprinted,
            report.failed.len()
        );
        Ok(report)
    }

    /// Snapshot of labelled recordings in `folders`
    pub fn build_candidate_pool(
        &self,
        folders: &[PathBuf],
        algorithm: AlgorithmId,
    ) -> Result<CandidatePool, EngineError> {
        let files = self
            .library
            .list_candidate_files(folders)
            .map_err(EngineError::Library)?;
        let provider = self.provider();
        let pool = self
            .pool
            .install(|| provider.collect_candidates(self.library.as_ref(), &files, algorithm))?;
        self.cache.flush()?;
        Ok(pool)
    }

    /// Best match for one file against a pool; the run is logged and kept
    /// in the diagnostics history
    pub fn find_best_match(
        &self,
        file: &FileRef,
        pool: &CandidatePool,
        threshold: f32,
    ) -> Result<(MatchResult, u64), EngineError> {
        let target = self.fingerprint(file, pool.algorithm)?;
        let candidates = pool.excluding(file);

        let result = self.matcher.find_best_match(
            &target,
            &file.folder,
            &candidates,
            &self.references()?,
            threshold,
        )?;
        let run_id = self.diagnostics.record(result.clone());
        diagnostics::log_match_run(run_id, &result);
        Ok((result, run_id))
    }

    /// Auto-label `files` against the labelled recordings of
    /// `candidate_folders`
    pub fn auto_label_batch(
        &self,
        files: &[FileRef],
        candidate_folders: &[PathBuf],
        options: &AutoLabelOptions,
        progress: &(dyn Fn(Progress) + Sync),
        cancel: &CancellationToken,
    ) -> Result<BatchReport, EngineError> {
        let pool = self.build_candidate_pool(candidate_folders, options.algorithm)?;
        let references = self.references()?;

        let controller = AutoLabelController {
            provider: self.provider(),
            matcher: &self.matcher,
            library: self.library.as_ref(),
            diagnostics: &self.diagnostics,
        };
        let report = self.pool.install(|| {
            controller.auto_label_batch(files, &pool, &references, options, progress, cancel)
        });

        self.cache.flush()?;
        log::info!(
            "Auto-label: {} of {} processed, {} labelled, {} failed",
            report.processed,
            files.len(),
            report.applied_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Match result of an earlier run
    pub fn diagnostics(&self, run_id: u64) -> Option<MatchResult> {
        self.diagnostics.get(run_id)
    }

    /// Id of the most recent matching run
    pub fn last_run_id(&self) -> Option<u64> {
        self.diagnostics.last_run_id()
    }

    /// Drop cached fingerprints of deleted files in `folder`
    pub fn prune_cache(&self, folder: &std::path::Path) -> Result<usize, EngineError> {
        let removed = self.cache.prune_missing(folder);
        self.cache.flush()?;
        Ok(removed)
    }
}
