//! Cache file format structures
//!
//! One JSON document per practice folder maps the relative filename of each
//! recording to its fingerprint record:
//!
//! ```json
//! {
//!   "version": 1,
//!   "updated_at": "2024-05-01T18:22:03+00:00",
//!   "entries": {
//!     "take_03.wav": { "algorithm_id": "chroma_timeline", "vector": [...], "mtime": 1714580000000 }
//!   }
//! }
//! ```
//!
//! Readers ignore fields they do not know, so newer writers can add to a
//! record without breaking older builds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Current format version
pub const VERSION: u32 = 1;

/// Directory created inside each practice folder to hold engine state
pub const DEFAULT_CACHE_DIR: &str = ".riffmatch";

/// Name of the per-folder fingerprint cache file
pub const DEFAULT_CACHE_FILE: &str = "fingerprints.json";

/// Pitch classes per chroma frame
pub const CHROMA_BINS: usize = 12;

/// Time segments in the chroma timeline descriptor
pub const TIMELINE_SEGMENTS: usize = 12;

/// Log-spaced bands in the band-energy descriptor
pub const ENERGY_BANDS: usize = 16;

/// Fingerprint algorithm identifier.
///
/// The identifier is part of a fingerprint's identity: vectors produced by
/// different algorithms are never comparable, and each algorithm always
/// produces vectors of the same length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmId {
    /// Mean pitch-class profile (12 values)
    Chroma,
    /// Pitch-class profile per time segment (12 x 12 values)
    ChromaTimeline,
    /// Mean band-energy ratios over log-spaced bands (16 values)
    BandEnergy,
}

impl AlgorithmId {
    pub const ALL: [AlgorithmId; 3] = [
        AlgorithmId::Chroma,
        AlgorithmId::ChromaTimeline,
        AlgorithmId::BandEnergy,
    ];

    /// Fixed vector length produced by this algorithm
    pub fn vector_len(self) -> usize {
        match self {
            AlgorithmId::Chroma => CHROMA_BINS,
            AlgorithmId::ChromaTimeline => CHROMA_BINS * TIMELINE_SEGMENTS,
            AlgorithmId::BandEnergy => ENERGY_BANDS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmId::Chroma => "chroma",
            AlgorithmId::ChromaTimeline => "chroma_timeline",
            AlgorithmId::BandEnergy => "band_energy",
        }
    }
}

impl Default for AlgorithmId {
    fn default() -> Self {
        AlgorithmId::ChromaTimeline
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlgorithmId::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown algorithm '{}' (expected one of: chroma, chroma_timeline, band_energy)",
                    s
                )
            })
    }
}

/// One cached fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub algorithm_id: AlgorithmId,
    pub vector: Vec<f32>,
    /// Source file modification time, milliseconds since the Unix epoch
    pub mtime: i64,
    /// Analysis frames that went into the vector (absent in early files)
    #[serde(default)]
    pub frame_count: u32,
    /// Stable identity of the source file when it is not its path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
}

impl CacheRecord {
    /// Check the record is usable: correct vector length, finite values
    pub fn validate(&self) -> Result<(), String> {
        let expected = self.algorithm_id.vector_len();
        if self.vector.len() != expected {
            return Err(format!(
                "vector has {} values, {} requires {}",
                self.vector.len(),
                self.algorithm_id,
                expected
            ));
        }
        if let Some(pos) = self.vector.iter().position(|v| !v.is_finite()) {
            return Err(format!("non-finite value at index {}", pos));
        }
        Ok(())
    }
}

/// Complete cache file as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub entries: BTreeMap<String, CacheRecord>,
}

impl CacheFile {
    pub fn new(entries: BTreeMap<String, CacheRecord>) -> Self {
        Self {
            version: VERSION,
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
            entries,
        }
    }
}

/// Location of the cache file for a practice folder
pub fn cache_path(folder: &Path, cache_dir: &str, cache_file: &str) -> PathBuf {
    folder.join(cache_dir).join(cache_file)
}
