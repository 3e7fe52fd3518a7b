//! File/folder manager collaborator
//!
//! The engine never walks the library or writes metadata itself. Whoever owns
//! the library (the desktop app, or the CLI's sidecar store) implements
//! [`FolderManager`] and the engine calls back into it.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// A recording in the library
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    /// Normalised path of the audio file
    pub path: PathBuf,
    /// Practice folder the file belongs to
    pub folder: PathBuf,
}

impl FileRef {
    /// Reference a file by path; its folder is the parent directory
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = normalize_path(path.as_ref());
        let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self { path, folder }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Folder-level reference flags set by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFolderMark {
    pub folder_path: PathBuf,
    /// Canonical recordings, boosted for every target
    #[serde(default)]
    pub is_global_reference: bool,
    /// Boosted only for targets in this same folder
    #[serde(default)]
    pub is_local_reference: bool,
}

impl ReferenceFolderMark {
    pub fn global(folder_path: impl AsRef<Path>) -> Self {
        Self {
            folder_path: normalize_path(folder_path.as_ref()),
            is_global_reference: true,
            is_local_reference: false,
        }
    }

    pub fn local(folder_path: impl AsRef<Path>) -> Self {
        Self {
            folder_path: normalize_path(folder_path.as_ref()),
            is_global_reference: false,
            is_local_reference: true,
        }
    }
}

/// Library operations the engine consumes
pub trait FolderManager: Send + Sync {
    /// Audio files contained in the given folders
    fn list_candidate_files(&self, folders: &[PathBuf]) -> anyhow::Result<Vec<FileRef>>;

    fn reference_folder_marks(&self) -> anyhow::Result<Vec<ReferenceFolderMark>>;

    /// Song name the user gave this recording, if any
    fn provided_name(&self, file: &FileRef) -> anyhow::Result<Option<String>>;

    /// Write a song name back to the recording's metadata
    fn apply_provided_name(&self, file: &FileRef, name: &str) -> anyhow::Result<()>;
}

/// Canonical form of a path.
///
/// Uses the filesystem when the path exists and falls back to lexical
/// normalisation otherwise (deleted files still need a stable key).
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
