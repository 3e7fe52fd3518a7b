//! Errors for cache file I/O

use std::path::PathBuf;
use thiserror::Error;

/// Whole-file failure reading or writing a cache document
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("cache file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FormatError {
    /// True when the cache file simply does not exist yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, FormatError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// A single record that could not be used; the rest of the file still loads
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("corrupt cache record for {file}: {reason}")]
pub struct CacheCorruptionError {
    pub file: String,
    pub reason: String,
}
