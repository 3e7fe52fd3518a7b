//! Cache file writer

use crate::error::FormatError;
use crate::format::{CacheRecord, VERSION};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct CacheFileOut<'a> {
    version: u32,
    updated_at: String,
    entries: &'a BTreeMap<String, CacheRecord>,
}

pub struct CacheWriter;

impl CacheWriter {
    /// Write all records of one folder.
    ///
    /// The document goes to a sibling temp file first and is renamed over the
    /// target, so a reader never observes a half-written cache.
    pub fn write(path: &Path, entries: &BTreeMap<String, CacheRecord>) -> Result<(), FormatError> {
        let io_err = |source| FormatError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let file = File::create(&tmp_path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        let doc = CacheFileOut {
            version: VERSION,
            updated_at: chrono::Utc::now().to_rfc3339(),
            entries,
        };
        serde_json::to_writer(&mut writer, &doc).map_err(|source| FormatError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)?;
        drop(writer);

        std::fs::rename(&tmp_path, path).map_err(io_err)?;
        Ok(())
    }
}
