//! Error taxonomy for the matching engine
//!
//! * [`DecodeError`]: a recording could not be turned into samples. Batch
//!   processing records it against the file and moves on.
//! * [`IncompatibleFingerprintError`]: two fingerprints of different algorithm
//!   or shape were compared. This is a programming or configuration fault and
//!   is never coerced into a score.
//! * [`CacheCorruptionError`]: one unusable cache record. Skipped and logged.
//!
//! An empty candidate pool is not an error; it yields a `MatchResult` without
//! a selection.

use riffmatch_fp::AlgorithmId;
use std::path::PathBuf;
use thiserror::Error;

pub use riffmatch_fp::{CacheCorruptionError, FormatError};

/// Audio could not be decoded or the sample buffer is unusable
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("audio file not found: {0}")]
    NotFound(PathBuf),

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("could not decode {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("sample buffer is empty")]
    EmptyBuffer,

    #[error("invalid sample rate {found} Hz (analysis runs at {expected} Hz)")]
    InvalidSampleRate { found: u32, expected: u32 },
}

impl DecodeError {
    pub(crate) fn corrupt(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        DecodeError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Two fingerprints cannot be compared
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IncompatibleFingerprintError {
    #[error("cannot compare {left} fingerprint with {right} fingerprint")]
    AlgorithmMismatch { left: AlgorithmId, right: AlgorithmId },

    #[error("fingerprint vector lengths differ ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
}

/// Whole-cache failure (write side, or an unreadable folder on explicit load)
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("fingerprint for {file} does not belong to folder {folder}")]
    OutsideFolder { file: PathBuf, folder: PathBuf },

    #[error("cannot read file identity of {path}: {source}")]
    Identity {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the engine facade
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Incompatible(#[from] IncompatibleFingerprintError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("library error: {0}")]
    Library(anyhow::Error),
}
