//! Settings file for riffmatch
//!
//! TOML-based configuration bundling analysis, matching, cache and worker
//! parameters. Every section is optional.

use crate::config::{AnalysisConfig, MatchingConfig};
use crate::library::ReferenceFolderMark;
use riffmatch_fp::{AlgorithmId, DEFAULT_CACHE_DIR, DEFAULT_CACHE_FILE};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RiffmatchSettings {
    #[serde(default)]
    pub algorithm: AlgorithmId,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub reference_folders: Vec<ReferenceFolderMark>,
}

/// How a recording is identified in the cache
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStrategy {
    /// Normalised absolute path
    #[default]
    Path,
    /// CRC-64 of the file contents, for libraries whose paths move around
    ContentHash,
}

/// Fingerprint cache configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_dir_name")]
    pub dir_name: String,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub identity: IdentityStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_name: default_dir_name(),
            file_name: default_file_name(),
            identity: IdentityStrategy::default(),
        }
    }
}

fn default_dir_name() -> String {
    DEFAULT_CACHE_DIR.to_string()
}
fn default_file_name() -> String {
    DEFAULT_CACHE_FILE.to_string()
}

/// Worker pool configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct WorkerConfig {
    /// Worker threads; `None` or `0` sizes the pool to the available cores
    #[serde(default)]
    pub threads: Option<usize>,
}

impl WorkerConfig {
    /// Build the CPU pool used for extraction and matching
    pub fn build_pool(&self) -> anyhow::Result<rayon::ThreadPool> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("riffmatch-worker-{}", i));
        if let Some(threads) = self.threads.filter(|&n| n > 0) {
            builder = builder.num_threads(threads);
        }
        builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build worker pool: {}", e))
    }
}

impl RiffmatchSettings {
    /// Load settings from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e))?;
        let settings: RiffmatchSettings = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from `path` if given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.analysis.validate()?;
        self.matching.validate()?;
        if self.cache.dir_name.is_empty() || self.cache.file_name.is_empty() {
            anyhow::bail!("cache dir_name and file_name must not be empty");
        }
        Ok(())
    }
}
