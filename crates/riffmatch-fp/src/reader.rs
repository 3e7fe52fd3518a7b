//! Cache file reader
//!
//! Parsing is done record by record so that one malformed entry never costs
//! the rest of the folder's fingerprints.

use crate::error::{CacheCorruptionError, FormatError};
use crate::format::{CacheRecord, VERSION};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Result of reading a cache file
#[derive(Debug, Clone, Default)]
pub struct LoadedCache {
    /// Format version declared by the file
    pub version: u32,
    /// Records that parsed and validated
    pub records: BTreeMap<String, CacheRecord>,
    /// Records that were skipped
    pub rejected: Vec<CacheCorruptionError>,
}

/// Loose top-level shape: entries stay untyped until validated one by one
#[derive(Deserialize)]
struct RawCacheFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    entries: serde_json::Map<String, serde_json::Value>,
}

pub struct CacheReader;

impl CacheReader {
    /// Read a cache file from disk
    pub fn read(path: &Path) -> Result<LoadedCache, FormatError> {
        let json_str = std::fs::read_to_string(path).map_err(|source| FormatError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&json_str).map_err(|e| match e {
            FormatError::Json { source, .. } => FormatError::Json {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse cache file contents
    pub fn parse(json_str: &str) -> Result<LoadedCache, FormatError> {
        let raw: RawCacheFile = serde_json::from_str(json_str).map_err(|source| FormatError::Json {
            path: Default::default(),
            source,
        })?;

        if raw.version > VERSION {
            log::debug!(
                "Cache file version {} is newer than {}, reading known fields only",
                raw.version,
                VERSION
            );
        }

        let mut loaded = LoadedCache {
            version: raw.version,
            ..Default::default()
        };

        for (file, value) in raw.entries {
            let record = match serde_json::from_value::<CacheRecord>(value) {
                Ok(record) => record,
                Err(e) => {
                    loaded.rejected.push(CacheCorruptionError {
                        file,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if let Err(reason) = record.validate() {
                loaded.rejected.push(CacheCorruptionError { file, reason });
                continue;
            }
            loaded.records.insert(file, record);
        }

        Ok(loaded)
    }
}
