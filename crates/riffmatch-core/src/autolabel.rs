//! Batch auto-labelling
//!
//! For every file of a batch: make sure a fingerprint exists (cache hit or
//! decode, extract and cache), match it against a fixed candidate pool and
//! write the winning song name back through the [`FolderManager`].
//!
//! Failure policy: anything that goes wrong with one file is recorded in that
//! file's [`LabelOutcome`] and logged; the rest of the batch carries on. The
//! batch stops early only when its [`CancellationToken`] fires, which is
//! checked before each file. Labels already written stay written.

use crate::audio::SignalLoader;
use crate::cache::{file_identity, modified_millis, FingerprintCache};
use crate::diagnostics::{self, DiagnosticsStore};
use crate::error::{DecodeError, EngineError};
use crate::extractor::FingerprintExtractor;
use crate::fingerprint::Fingerprint;
use crate::library::{FileRef, FolderManager};
use crate::matching::{CrossFolderMatcher, MatchCandidate, MatchResult, ReferenceIndex};
use rayon::prelude::*;
use riffmatch_fp::AlgorithmId;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Batch-level cancellation flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Reported after each file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub file: FileRef,
}

/// Serialises progress callbacks so `completed` only ever grows
pub(crate) struct ProgressCounter<'a> {
    total: usize,
    done: Mutex<usize>,
    callback: &'a (dyn Fn(Progress) + Sync),
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(total: usize, callback: &'a (dyn Fn(Progress) + Sync)) -> Self {
        Self {
            total,
            done: Mutex::new(0),
            callback,
        }
    }

    pub(crate) fn advance(&self, file: &FileRef) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done += 1;
        (self.callback)(Progress {
            completed: *done,
            total: self.total,
            file: file.clone(),
        });
    }
}

/// Per-batch options
#[derive(Debug, Clone, PartialEq)]
pub struct AutoLabelOptions {
    pub threshold: f32,
    pub algorithm: AlgorithmId,
    /// Replace names the user already gave
    pub overwrite_existing: bool,
    /// Match and report without writing names
    pub dry_run: bool,
}

/// Result for one file of a batch
#[derive(Debug, Clone, Serialize)]
pub struct LabelOutcome {
    pub file: FileRef,
    /// `None` when the file could not be analysed
    pub match_result: Option<MatchResult>,
    pub applied: bool,
    /// Name of the selected candidate, if any
    pub label: Option<String>,
    /// Id of the diagnostics entry for this file's matching run
    pub run_id: Option<u64>,
    pub error: Option<String>,
}

impl LabelOutcome {
    fn failed(file: &FileRef, error: &EngineError) -> Self {
        Self {
            file: file.clone(),
            match_result: None,
            applied: false,
            label: None,
            run_id: None,
            error: Some(error.to_string()),
        }
    }
}

/// Outcomes of a batch.
///
/// `outcomes` keeps input order but only holds files that were handled. After
/// a cancellation the files never started are listed in `skipped`, so
/// `outcomes[i]` lines up with the i-th input file only when `skipped` is
/// empty. Use [`LabelOutcome::file`] to tell outcomes apart.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<LabelOutcome>,
    /// Files handled before the batch ended
    pub processed: usize,
    pub cancelled: bool,
    /// Files not started because the batch was cancelled, in input order
    pub skipped: Vec<FileRef>,
}

impl BatchReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.applied).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.match_result.is_none()).count()
    }
}

/// Read-only snapshot of labelled recordings to match against
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    pub algorithm: AlgorithmId,
    pub candidates: Vec<MatchCandidate>,
}

impl CandidatePool {
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Candidates other than `file` itself. Byte-identical copies elsewhere
    /// stay in.
    pub fn excluding(&self, file: &FileRef) -> Cow<'_, [MatchCandidate]> {
        if self.candidates.iter().any(|c| c.source_path == file.path) {
            Cow::Owned(
                self.candidates
                    .iter()
                    .filter(|c| c.source_path != file.path)
                    .cloned()
                    .collect(),
            )
        } else {
            Cow::Borrowed(&self.candidates)
        }
    }
}

/// Cache-backed fingerprint lookup with extraction on miss
pub struct FingerprintProvider<'a> {
    pub loader: &'a dyn SignalLoader,
    pub extractor: &'a FingerprintExtractor,
    pub cache: &'a FingerprintCache,
}

impl<'a> FingerprintProvider<'a> {
    /// Fingerprint of `file` for `algorithm`, extracting it when the cache
    /// has nothing current
    pub fn ensure(&self, file: &FileRef, algorithm: AlgorithmId) -> Result<Fingerprint, EngineError> {
        let lock = self.cache.entry_lock(&file.path.to_string_lossy());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(fp) = self.cache.get(&file.path) {
            if fp.algorithm_id() == algorithm {
                return Ok(fp);
            }
        }

        // Stat before decoding so an edit during extraction leaves a stale record
        let mtime = modified_millis(&file.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DecodeError::NotFound(file.path.clone()),
            _ => DecodeError::corrupt(&file.path, e),
        })?;

        let buffer = self.loader.load(&file.path)?;
        let file_id = file_identity(&file.path, self.cache.config().identity)?;
        let fp = self
            .extractor
            .extract(&buffer, algorithm)?
            .with_source(file_id, mtime);

        log::debug!(
            "Extracted {} fingerprint for {} ({} frames)",
            algorithm,
            file.path.display(),
            fp.frame_count()
        );
        self.cache.put(&file.path, fp.clone())?;
        Ok(fp)
    }

    /// Fingerprints of the labelled files among `files`.
    ///
    /// Unlabelled files are not candidates and are never decoded. Files that
    /// fail to decode are logged and left out of the pool.
    pub fn collect_candidates(
        &self,
        library: &dyn FolderManager,
        files: &[FileRef],
        algorithm: AlgorithmId,
    ) -> Result<CandidatePool, EngineError> {
        let mut labelled = Vec::new();
        for file in files {
            match library.provided_name(file).map_err(EngineError::Library)? {
                Some(name) if !name.trim().is_empty() => labelled.push((file, name)),
                _ => {}
            }
        }

        let mut candidates: Vec<MatchCandidate> = labelled
            .par_iter()
            .filter_map(|(file, name)| match self.ensure(file, algorithm) {
                Ok(fingerprint) => Some(MatchCandidate {
                    fingerprint,
                    provided_name: name.clone(),
                    folder_path: file.folder.clone(),
                    source_path: file.path.clone(),
                }),
                Err(e) => {
                    log::warn!("Leaving {} out of the candidate pool: {}", file.path.display(), e);
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.folder_path
                .cmp(&b.folder_path)
                .then_with(|| a.source_path.cmp(&b.source_path))
        });

        log::info!(
            "Candidate pool: {} labelled recordings out of {} files",
            candidates.len(),
            files.len()
        );
        Ok(CandidatePool {
            algorithm,
            candidates,
        })
    }
}

/// Runs auto-label batches
pub struct AutoLabelController<'a> {
    pub provider: FingerprintProvider<'a>,
    pub matcher: &'a CrossFolderMatcher,
    pub library: &'a dyn FolderManager,
    pub diagnostics: &'a DiagnosticsStore,
}

impl<'a> AutoLabelController<'a> {
    /// Label every file of `files` from `pool`.
    ///
    /// Units run on the current rayon pool. Outcomes come back in input
    /// order; when cancelled, files not yet started go to
    /// [`BatchReport::skipped`] instead.
    pub fn auto_label_batch(
        &self,
        files: &[FileRef],
        pool: &CandidatePool,
        references: &ReferenceIndex,
        options: &AutoLabelOptions,
        progress: &(dyn Fn(Progress) + Sync),
        cancel: &CancellationToken,
    ) -> BatchReport {
        let counter = ProgressCounter::new(files.len(), progress);

        let outcomes: Vec<Option<LabelOutcome>> = files
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = self.label_one(file, pool, references, options);
                counter.advance(file);
                Some(outcome)
            })
            .collect();

        let mut handled = Vec::with_capacity(outcomes.len());
        let mut skipped = Vec::new();
        for (file, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Some(outcome) => handled.push(outcome),
                None => skipped.push(file.clone()),
            }
        }
        let processed = handled.len();
        let cancelled = !skipped.is_empty();
        if cancelled {
            log::info!("Batch cancelled after {} of {} files", processed, files.len());
        }

        BatchReport {
            outcomes: handled,
            processed,
            cancelled,
            skipped,
        }
    }

    fn label_one(
        &self,
        file: &FileRef,
        pool: &CandidatePool,
        references: &ReferenceIndex,
        options: &AutoLabelOptions,
    ) -> LabelOutcome {
        let (result, run_id) = match self.match_one(file, pool, references, options) {
            Ok(matched) => matched,
            Err(e) => {
                log::warn!("Could not analyze {}: {}", file.path.display(), e);
                return LabelOutcome::failed(file, &e);
            }
        };

        let label = result.selected.as_ref().map(|c| c.provided_name.clone());
        let mut outcome = LabelOutcome {
            file: file.clone(),
            match_result: Some(result),
            applied: false,
            label: label.clone(),
            run_id: Some(run_id),
            error: None,
        };

        let Some(name) = label else {
            return outcome;
        };
        match self.apply_label(file, &name, options) {
            Ok(applied) => outcome.applied = applied,
            Err(e) => {
                log::warn!("Could not label {}: {}", file.path.display(), e);
                outcome.error = Some(e.to_string());
            }
        }
        outcome
    }

    fn match_one(
        &self,
        file: &FileRef,
        pool: &CandidatePool,
        references: &ReferenceIndex,
        options: &AutoLabelOptions,
    ) -> Result<(MatchResult, u64), EngineError> {
        let target = self.provider.ensure(file, options.algorithm)?;

        let candidates = pool.excluding(file);

        let result = self.matcher.find_best_match(
            &target,
            &file.folder,
            &candidates,
            references,
            options.threshold,
        )?;

        let run_id = self.diagnostics.record(result.clone());
        diagnostics::log_match_run(run_id, &result);
        Ok((result, run_id))
    }

    /// Write `name` unless options or an existing name say otherwise
    fn apply_label(&self, file: &FileRef, name: &str, options: &AutoLabelOptions) -> anyhow::Result<bool> {
        let existing = self.library.provided_name(file)?;
        if let Some(existing) = existing.filter(|n| !n.trim().is_empty()) {
            if existing == name {
                return Ok(false);
            }
            if !options.overwrite_existing {
                log::debug!(
                    "Keeping existing name '{}' for {} (matched '{}')",
                    existing,
                    file.path.display(),
                    name
                );
                return Ok(false);
            }
        }

        if options.dry_run {
            log::info!("Would label {} as '{}'", file.path.display(), name);
            return Ok(false);
        }

        self.library.apply_provided_name(file, name)?;
        log::info!("Labelled {} as '{}'", file.path.display(), name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleBuffer;
    use crate::config::{AnalysisConfig, MatchingConfig};
    use crate::library::ReferenceFolderMark;
    use crate::settings::{CacheConfig, IdentityStrategy};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// Synthesises a tone per file name prefix instead of decoding
    struct ToneLoader;

    impl SignalLoader for ToneLoader {
        fn load(&self, path: &Path) -> Result<SampleBuffer, DecodeError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            let freq = if name.starts_with("riff") {
                220.0
            } else if name.starts_with("ballad") {
                311.1
            } else {
                return Err(DecodeError::corrupt(path, "bad header"));
            };
            let rate = 11025;
            let samples = (0..rate * 3)
                .map(|i| {
                    let t = i as f32 / rate as f32;
                    0.5 * (2.0 * std::f32::consts::PI * freq * t).sin()
                })
                .collect();
            Ok(SampleBuffer::new(samples, rate))
        }
    }

    #[derive(Default)]
    struct MemoryLibrary {
        names: Mutex<HashMap<PathBuf, String>>,
    }

    impl MemoryLibrary {
        fn name_of(&self, file: &FileRef) -> Option<String> {
            self.names.lock().unwrap().get(&file.path).cloned()
        }
    }

    impl FolderManager for MemoryLibrary {
        fn list_candidate_files(&self, _folders: &[PathBuf]) -> anyhow::Result<Vec<FileRef>> {
            Ok(Vec::new())
        }

        fn reference_folder_marks(&self) -> anyhow::Result<Vec<ReferenceFolderMark>> {
            Ok(Vec::new())
        }

        fn provided_name(&self, file: &FileRef) -> anyhow::Result<Option<String>> {
            Ok(self.name_of(file))
        }

        fn apply_provided_name(&self, file: &FileRef, name: &str) -> anyhow::Result<()> {
            self.names
                .lock()
                .unwrap()
                .insert(file.path.clone(), name.to_string());
            Ok(())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        masters: Vec<FileRef>,
        takes: Vec<FileRef>,
        library: MemoryLibrary,
        extractor: FingerprintExtractor,
        cache: FingerprintCache,
        matcher: CrossFolderMatcher,
        diagnostics: DiagnosticsStore,
    }

    impl Fixture {
        fn new(take_names: &[&str]) -> Self {
            Self::with_cache(take_names, CacheConfig::default())
        }

        fn with_cache(take_names: &[&str], cache: CacheConfig) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let make = |folder: &str, name: &str| {
                let folder = dir.path().join(folder);
                std::fs::create_dir_all(&folder).unwrap();
                let path = folder.join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                FileRef::new(&path)
            };

            let masters = vec![make("masters", "riff.wav"), make("masters", "ballad.wav")];
            let takes = take_names.iter().map(|n| make("2024-05", n)).collect();

            let library = MemoryLibrary::default();
            library.apply_provided_name(&masters[0], "Riff").unwrap();
            library.apply_provided_name(&masters[1], "Ballad").unwrap();

            Self {
                _dir: dir,
                masters,
                takes,
                library,
                extractor: FingerprintExtractor::new(&AnalysisConfig::default()),
                cache: FingerprintCache::new(cache),
                matcher: CrossFolderMatcher::new(&MatchingConfig::default()),
                diagnostics: DiagnosticsStore::default(),
            }
        }

        fn provider(&self) -> FingerprintProvider<'_> {
            FingerprintProvider {
                loader: &ToneLoader,
                extractor: &self.extractor,
                cache: &self.cache,
            }
        }

        fn controller(&self) -> AutoLabelController<'_> {
            AutoLabelController {
                provider: self.provider(),
                matcher: &self.matcher,
                library: &self.library,
                diagnostics: &self.diagnostics,
            }
        }

        fn pool(&self) -> CandidatePool {
            let mut files = self.masters.clone();
            files.extend(self.takes.iter().cloned());
            self.provider()
                .collect_candidates(&self.library, &files, AlgorithmId::Chroma)
                .unwrap()
        }
    }

    fn options() -> AutoLabelOptions {
        AutoLabelOptions {
            threshold: 0.75,
            algorithm: AlgorithmId::Chroma,
            overwrite_existing: false,
            dry_run: false,
        }
    }

    #[test]
    fn test_pool_holds_only_labelled_files() {
        let fx = Fixture::new(&["riff-take1.wav", "corrupt.wav"]);
        let pool = fx.pool();
        let mut names: Vec<_> = pool.candidates.iter().map(|c| c.provided_name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["Ballad", "Riff"]);
    }

    #[test]
    fn test_batch_continues_past_corrupt_file() {
        let fx = Fixture::new(&["riff-take1.wav", "ballad-take1.wav", "corrupt.wav", "riff-take2.wav"]);
        let pool = fx.pool();
        let progress_calls = Mutex::new(Vec::new());

        let report = fx.controller().auto_label_batch(
            &fx.takes,
            &pool,
            &ReferenceIndex::default(),
            &options(),
            &|p: Progress| progress_calls.lock().unwrap().push(p.completed),
            &CancellationToken::new(),
        );

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.processed, 4);
        assert!(!report.cancelled);
        assert_eq!(*progress_calls.lock().unwrap(), vec![1, 2, 3, 4]);

        let failed = &report.outcomes[2];
        assert_eq!(failed.file, fx.takes[2]);
        assert!(failed.match_result.is_none());
        assert!(!failed.applied);
        assert!(failed.error.as_deref().unwrap().contains("bad header"));

        assert_eq!(report.outcomes[0].label.as_deref(), Some("Riff"));
        assert_eq!(report.outcomes[1].label.as_deref(), Some("Ballad"));
        assert_eq!(report.outcomes[3].label.as_deref(), Some("Riff"));
        assert_eq!(report.applied_count(), 3);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(fx.library.name_of(&fx.takes[3]).as_deref(), Some("Riff"));

        let run_id = report.outcomes[0].run_id.unwrap();
        assert!(fx.diagnostics.get(run_id).is_some());
    }

    #[test]
    fn test_cancelled_before_start() {
        let fx = Fixture::new(&["riff-take1.wav"]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = fx.controller().auto_label_batch(
            &fx.takes,
            &fx.pool(),
            &ReferenceIndex::default(),
            &options(),
            &|_| {},
            &cancel,
        );
        assert!(report.cancelled);
        assert_eq!(report.processed, 0);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.skipped, fx.takes);
    }

    #[test]
    fn test_cancel_between_files_keeps_applied_labels() {
        let fx = Fixture::new(&["riff-take1.wav", "riff-take2.wav", "riff-take3.wav"]);
        let pool = fx.pool();
        let cancel = CancellationToken::new();
        let single = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();

        let report = single.install(|| {
            fx.controller().auto_label_batch(
                &fx.takes,
                &pool,
                &ReferenceIndex::default(),
                &options(),
                &|_| cancel.cancel(),
                &cancel,
            )
        });

        assert!(report.cancelled);
        assert_eq!(report.processed, 1);
        assert_eq!(report.outcomes[0].file, fx.takes[0]);
        assert_eq!(report.skipped, fx.takes[1..].to_vec());
        assert!(report.outcomes[0].applied);
        assert_eq!(fx.library.name_of(&report.outcomes[0].file).as_deref(), Some("Riff"));
    }

    #[test]
    fn test_existing_names_and_dry_run() {
        let fx = Fixture::new(&["riff-take1.wav", "riff-take2.wav"]);
        fx.library.apply_provided_name(&fx.takes[0], "Working Title").unwrap();
        let pool = fx.pool();

        let dry = AutoLabelOptions {
            dry_run: true,
            ..options()
        };
        let report = fx.controller().auto_label_batch(
            &fx.takes,
            &pool,
            &ReferenceIndex::default(),
            &dry,
            &|_| {},
            &CancellationToken::new(),
        );
        assert_eq!(report.applied_count(), 0);
        assert_eq!(fx.library.name_of(&fx.takes[0]).as_deref(), Some("Working Title"));
        assert_eq!(fx.library.name_of(&fx.takes[1]), None);

        // Labelled take is in the pool but never matched against itself
        let first = report.outcomes[0].match_result.as_ref().unwrap();
        assert!(first
            .all_scored
            .iter()
            .all(|s| s.candidate.source_path != fx.takes[0].path));

        let overwrite = AutoLabelOptions {
            overwrite_existing: true,
            ..options()
        };
        let report = fx.controller().auto_label_batch(
            &fx.takes,
            &pool,
            &ReferenceIndex::default(),
            &overwrite,
            &|_| {},
            &CancellationToken::new(),
        );
        assert_eq!(report.applied_count(), 2);
        assert_eq!(fx.library.name_of(&fx.takes[0]).as_deref(), Some("Riff"));
        // Identical scores tie-break on folder path, and the take's folder sorts first
        assert_eq!(report.outcomes[1].label.as_deref(), Some("Working Title"));
    }

    #[test]
    fn test_identical_copy_matches_under_content_hash() {
        let fx = Fixture::with_cache(
            &["riff-copy.wav"],
            CacheConfig {
                identity: IdentityStrategy::ContentHash,
                ..CacheConfig::default()
            },
        );
        // Byte-identical to the labelled master, so both share a file id
        std::fs::copy(&fx.masters[0].path, &fx.takes[0].path).unwrap();
        let master_id = file_identity(&fx.masters[0].path, IdentityStrategy::ContentHash).unwrap();
        let copy_id = file_identity(&fx.takes[0].path, IdentityStrategy::ContentHash).unwrap();
        assert_eq!(master_id, copy_id);

        let pool = fx.pool();
        let report = fx.controller().auto_label_batch(
            &fx.takes,
            &pool,
            &ReferenceIndex::default(),
            &options(),
            &|_| {},
            &CancellationToken::new(),
        );

        let result = report.outcomes[0].match_result.as_ref().unwrap();
        assert_eq!(result.candidates_considered, 2);
        assert_eq!(result.raw_score, 1.0);
        assert_eq!(report.outcomes[0].label.as_deref(), Some("Riff"));
        assert_eq!(fx.library.name_of(&fx.takes[0]).as_deref(), Some("Riff"));

        // The labelled master still never matches itself
        let report = fx.controller().auto_label_batch(
            &fx.masters[..1],
            &pool,
            &ReferenceIndex::default(),
            &options(),
            &|_| {},
            &CancellationToken::new(),
        );
        let result = report.outcomes[0].match_result.as_ref().unwrap();
        assert_eq!(result.candidates_considered, 1);
        assert!(result
            .all_scored
            .iter()
            .all(|s| s.candidate.source_path != fx.masters[0].path));
    }

    #[test]
    fn test_ensure_uses_cache() {
        let fx = Fixture::new(&[]);
        let provider = fx.provider();
        let first = provider.ensure(&fx.masters[0], AlgorithmId::Chroma).unwrap();
        assert!(fx.cache.get(&fx.masters[0].path).is_some());
        let second = provider.ensure(&fx.masters[0], AlgorithmId::Chroma).unwrap();
        assert_eq!(first, second);

        let other = provider.ensure(&fx.masters[0], AlgorithmId::BandEnergy).unwrap();
        assert_eq!(other.algorithm_id(), AlgorithmId::BandEnergy);
    }
}
