//! Fingerprint cache
//!
//! One JSON document per practice folder (`<folder>/.riffmatch/fingerprints.json`)
//! maps file names to fingerprint records. Folder documents are loaded lazily
//! and kept in memory; `put` only touches memory and `flush` persists the
//! folders that changed.
//!
//! Locking: the folder map sits behind an `RwLock` that is only held long
//! enough to look up or insert a folder. Each folder guards its records with
//! its own `RwLock`, and callers serialise generation of one record through
//! [`FingerprintCache::entry_lock`]. No lock is held while decoding audio or
//! reading a cache file.

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::library::normalize_path;
use crate::settings::{CacheConfig, IdentityStrategy};
use crc::{Crc, CRC_64_ECMA_182};
use riffmatch_fp::{cache_path, CacheReader, CacheRecord, CacheWriter};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::UNIX_EPOCH;

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Records of one folder
struct FolderCache {
    cache_file: PathBuf,
    records: RwLock<BTreeMap<String, CacheRecord>>,
    dirty: AtomicBool,
    write_lock: Mutex<()>,
}

impl FolderCache {
    fn load(folder: &Path, config: &CacheConfig) -> Self {
        let cache_file = cache_path(folder, &config.dir_name, &config.file_name);
        let records = match CacheReader::read(&cache_file) {
            Ok(loaded) => {
                for rejected in &loaded.rejected {
                    log::warn!("{}: {}", cache_file.display(), rejected);
                }
                log::debug!(
                    "Loaded {} cached fingerprints from {}",
                    loaded.records.len(),
                    cache_file.display()
                );
                loaded.records
            }
            Err(e) if e.is_not_found() => BTreeMap::new(),
            Err(e) => {
                log::warn!("Ignoring unreadable fingerprint cache: {}", e);
                BTreeMap::new()
            }
        };

        Self {
            cache_file,
            records: RwLock::new(records),
            dirty: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }
}

/// Concurrent fingerprint cache over many folders
pub struct FingerprintCache {
    config: CacheConfig,
    folders: RwLock<HashMap<PathBuf, Arc<FolderCache>>>,
    entry_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FingerprintCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            folders: RwLock::new(HashMap::new()),
            entry_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Lock serialising work on one file identity.
    ///
    /// Locks nobody holds a handle to are dropped here, so the map only ever
    /// holds the keys currently being worked on.
    pub fn entry_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .entry_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Handles are only cloned under this mutex, so a count of 1 cannot
        // grow while we look at it
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }

    fn folder(&self, folder: &Path) -> Arc<FolderCache> {
        let key = normalize_path(folder);
        {
            let folders = self.folders.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cache) = folders.get(&key) {
                return cache.clone();
            }
        }

        // Read the document before taking the write lock; a racing loader may
        // win, in which case its copy is kept.
        let loaded = Arc::new(FolderCache::load(&key, &self.config));
        let mut folders = self.folders.write().unwrap_or_else(PoisonError::into_inner);
        folders.entry(key).or_insert(loaded).clone()
    }

    /// Cached fingerprint for `path`, if present and current.
    ///
    /// A record whose mtime differs from the file on disk is stale and
    /// reported as absent. With content-hash identity a renamed file is found
    /// under its old name and re-keyed.
    pub fn get(&self, path: &Path) -> Option<Fingerprint> {
        let (folder, name) = split_path(path)?;
        let live_mtime = modified_millis(path).ok()?;
        let cache = self.folder(&folder);

        let record = {
            let records = cache.records.read().unwrap_or_else(PoisonError::into_inner);
            records.get(&name).cloned()
        };

        let record = match record {
            Some(record) if record.mtime == live_mtime => record,
            Some(record) => {
                log::debug!(
                    "Stale fingerprint for {} (cached mtime {}, file mtime {})",
                    path.display(),
                    record.mtime,
                    live_mtime
                );
                return None;
            }
            None if self.config.identity == IdentityStrategy::ContentHash => {
                self.find_renamed(&cache, path, &name, live_mtime)?
            }
            None => return None,
        };

        let file_id = match &record.file_id {
            Some(id) => id.clone(),
            None => file_identity(path, self.config.identity).ok()?,
        };
        match Fingerprint::from_record(&record, file_id) {
            Ok(fp) => Some(fp),
            Err(e) => {
                log::warn!("Discarding cached fingerprint for {}: {}", path.display(), e);
                None
            }
        }
    }

    fn find_renamed(
        &self,
        cache: &FolderCache,
        path: &Path,
        name: &str,
        live_mtime: i64,
    ) -> Option<CacheRecord> {
        let file_id = file_identity(path, IdentityStrategy::ContentHash).ok()?;
        let mut records = cache.records.write().unwrap_or_else(PoisonError::into_inner);
        let old_name = records
            .iter()
            .find(|(_, r)| r.mtime == live_mtime && r.file_id.as_deref() == Some(file_id.as_str()))
            .map(|(k, _)| k.clone())?;

        // Only re-key when the old name is really gone
        let old_path = path.with_file_name(&old_name);
        if old_path.exists() {
            return records.get(&old_name).cloned();
        }

        let record = records.remove(&old_name)?;
        log::debug!("Fingerprint for {} moved from {}", name, old_name);
        records.insert(name.to_string(), record.clone());
        cache.dirty.store(true, Ordering::Release);
        Some(record)
    }

    /// Store a fingerprint for `path` (in memory until `flush`)
    pub fn put(&self, path: &Path, fingerprint: Fingerprint) -> Result<(), CacheError> {
        let (folder, name) = split_path(path).ok_or_else(|| CacheError::OutsideFolder {
            file: path.to_path_buf(),
            folder: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        })?;

        let mut record = fingerprint.to_record();
        if record.file_id.as_deref().map_or(true, str::is_empty) {
            record.file_id = Some(file_identity(path, self.config.identity)?);
        }

        let cache = self.folder(&folder);
        let mut records = cache.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(name, record);
        cache.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Drop the record for `path`
    pub fn invalidate(&self, path: &Path) {
        let Some((folder, name)) = split_path(path) else {
            return;
        };
        let cache = self.folder(&folder);
        let mut records = cache.records.write().unwrap_or_else(PoisonError::into_inner);
        if records.remove(&name).is_some() {
            cache.dirty.store(true, Ordering::Release);
        }
    }

    /// All current fingerprints of a folder, keyed by path.
    ///
    /// Records of deleted or modified files are left out. Identical copies
    /// share a file id under content-hash identity but keep separate entries.
    pub fn load_all(&self, folder: &Path) -> HashMap<PathBuf, Fingerprint> {
        let cache = self.folder(folder);
        let records = cache.records.read().unwrap_or_else(PoisonError::into_inner);
        let base = normalize_path(folder);

        let mut out = HashMap::with_capacity(records.len());
        for (name, record) in records.iter() {
            let path = base.join(name);
            match modified_millis(&path) {
                Ok(mtime) if mtime == record.mtime => {}
                _ => continue,
            }
            let file_id = match &record.file_id {
                Some(id) => id.clone(),
                None => path.to_string_lossy().into_owned(),
            };
            match Fingerprint::from_record(record, file_id) {
                Ok(fp) => {
                    out.insert(path, fp);
                }
                Err(e) => log::warn!("Skipping cached fingerprint {}: {}", path.display(), e),
            }
        }
        out
    }

    /// Persist every folder changed since the last flush
    pub fn flush(&self) -> Result<(), CacheError> {
        let folders: Vec<Arc<FolderCache>> = {
            let folders = self.folders.read().unwrap_or_else(PoisonError::into_inner);
            folders.values().cloned().collect()
        };

        for cache in folders {
            if !cache.dirty.swap(false, Ordering::AcqRel) {
                continue;
            }
            let _guard = cache.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let snapshot = cache
                .records
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();

            if let Err(e) = CacheWriter::write(&cache.cache_file, &snapshot) {
                cache.dirty.store(true, Ordering::Release);
                return Err(e.into());
            }
            log::debug!(
                "Wrote {} fingerprints to {}",
                snapshot.len(),
                cache.cache_file.display()
            );
        }
        Ok(())
    }

    /// Remove records of files that no longer exist; returns how many
    pub fn prune_missing(&self, folder: &Path) -> usize {
        let base = normalize_path(folder);
        let cache = self.folder(&base);
        let mut records = cache.records.write().unwrap_or_else(PoisonError::into_inner);

        let before = records.len();
        records.retain(|name, _| base.join(name).exists());
        let removed = before - records.len();
        if removed > 0 {
            cache.dirty.store(true, Ordering::Release);
            log::info!("Pruned {} fingerprints from {}", removed, base.display());
        }
        removed
    }

    /// Discard a folder removed from the library, on disk as well
    pub fn forget_folder(&self, folder: &Path) -> Result<(), CacheError> {
        let key = normalize_path(folder);
        self.folders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        let cache_file = cache_path(&key, &self.config.dir_name, &self.config.file_name);
        match std::fs::remove_file(&cache_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(riffmatch_fp::FormatError::Io {
                path: cache_file,
                source,
            }
            .into()),
        }
    }
}

fn split_path(path: &Path) -> Option<(PathBuf, String)> {
    let path = normalize_path(path);
    let name = path.file_name()?.to_string_lossy().into_owned();
    let folder = path.parent()?.to_path_buf();
    Some((folder, name))
}

/// Modification time in milliseconds since the Unix epoch
pub fn modified_millis(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    })
}

/// Stable identity of a recording under the given strategy
pub fn file_identity(path: &Path, strategy: IdentityStrategy) -> Result<String, CacheError> {
    match strategy {
        IdentityStrategy::Path => Ok(normalize_path(path).to_string_lossy().into_owned()),
        IdentityStrategy::ContentHash => {
            let identity_err = |source| CacheError::Identity {
                path: path.to_path_buf(),
                source,
            };
            let mut file = std::fs::File::open(path).map_err(identity_err)?;
            let mut digest = CRC64.digest();
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = file.read(&mut buf).map_err(identity_err)?;
                if n == 0 {
                    break;
                }
                digest.update(&buf[..n]);
            }
            Ok(format!("crc64:{:016x}", digest.finalize()))
        }
    }
}
