//! Riffmatch Core - audio fingerprinting and cross-folder matching
//!
//! Turns practice recordings into compact spectral fingerprints, caches them
//! per folder, and finds which labelled recording a new take most likely is.
//!
//! Pipeline: [`SignalLoader`] → [`FingerprintExtractor`] → [`FingerprintCache`]
//! and [`similarity::score`] → [`CrossFolderMatcher`] → [`AutoLabelController`].

pub mod audio;
pub mod autolabel;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod fingerprint;
pub mod library;
pub mod matching;
pub mod settings;
pub mod similarity;
pub mod transform;

pub use audio::{FileSignalLoader, SampleBuffer, SignalLoader};
pub use autolabel::{
    AutoLabelController, AutoLabelOptions, BatchReport, CancellationToken, CandidatePool,
    FingerprintProvider, LabelOutcome, Progress,
};
pub use cache::FingerprintCache;
pub use config::{AnalysisConfig, MatchingConfig};
pub use diagnostics::DiagnosticsStore;
pub use engine::{Engine, GenerateReport};
pub use error::{
    CacheCorruptionError, CacheError, DecodeError, EngineError, IncompatibleFingerprintError,
};
pub use extractor::FingerprintExtractor;
pub use fingerprint::Fingerprint;
pub use library::{FileRef, FolderManager, ReferenceFolderMark};
pub use matching::{Boost, CrossFolderMatcher, MatchCandidate, MatchResult, ReferenceIndex, ScoredCandidate};
pub use riffmatch_fp::AlgorithmId;
pub use settings::{CacheConfig, IdentityStrategy, RiffmatchSettings, WorkerConfig};
