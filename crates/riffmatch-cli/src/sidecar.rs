//! Sidecar-file folder manager
//!
//! Song names live next to the recordings in `<folder>/.riffmatch/names.json`
//! (file name → song name). Reference marks come from the settings file.

use anyhow::{Context, Result};
use riffmatch_core::audio::AudioFormat;
use riffmatch_core::{FileRef, FolderManager, ReferenceFolderMark, RiffmatchSettings};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use walkdir::WalkDir;

pub const NAMES_FILE: &str = "names.json";

pub struct SidecarLibrary {
    dir_name: String,
    marks: Vec<ReferenceFolderMark>,
    /// Serialises read-modify-write of names files
    write_lock: Mutex<()>,
}

impl SidecarLibrary {
    pub fn new(settings: &RiffmatchSettings) -> Self {
        Self {
            dir_name: settings.cache.dir_name.clone(),
            marks: settings.reference_folders.clone(),
            write_lock: Mutex::new(()),
        }
    }

    fn names_path(&self, folder: &Path) -> PathBuf {
        riffmatch_fp::cache_path(folder, &self.dir_name, NAMES_FILE)
    }

    fn read_names(&self, folder: &Path) -> Result<BTreeMap<String, String>> {
        let path = self.names_path(folder);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
        };
        serde_json::from_str(&content).with_context(|| format!("Malformed names file {}", path.display()))
    }

    fn write_names(&self, folder: &Path, names: &BTreeMap<String, String>) -> Result<()> {
        let path = self.names_path(folder);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec_pretty(names)?)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

impl FolderManager for SidecarLibrary {
    fn list_candidate_files(&self, folders: &[PathBuf]) -> Result<Vec<FileRef>> {
        let mut files = Vec::new();
        for folder in folders {
            if !folder.is_dir() {
                anyhow::bail!("Not a folder: {}", folder.display());
            }
            for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Error accessing entry: {}", e);
                        continue;
                    }
                };
                if entry.file_type().is_file() && AudioFormat::from_path(entry.path()).is_supported() {
                    files.push(FileRef::new(entry.path()));
                }
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files.dedup();
        log::info!("Found {} audio files in {} folders", files.len(), folders.len());
        Ok(files)
    }

    fn reference_folder_marks(&self) -> Result<Vec<ReferenceFolderMark>> {
        Ok(self.marks.clone())
    }

    fn provided_name(&self, file: &FileRef) -> Result<Option<String>> {
        let names = self.read_names(&file.folder)?;
        Ok(names.get(&file.file_name()).cloned())
    }

    fn apply_provided_name(&self, file: &FileRef, name: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names = self.read_names(&file.folder)?;
        names.insert(file.file_name(), name.to_string());
        self.write_names(&file.folder, &names)
    }
}
