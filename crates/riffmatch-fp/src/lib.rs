//! Riffmatch fingerprint cache file format library

pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use error::{CacheCorruptionError, FormatError};
pub use format::{
    cache_path, AlgorithmId, CacheFile, CacheRecord, CHROMA_BINS, DEFAULT_CACHE_DIR,
    DEFAULT_CACHE_FILE, ENERGY_BANDS, TIMELINE_SEGMENTS, VERSION,
};
pub use reader::{CacheReader, LoadedCache};
pub use writer::CacheWriter;
