//! Cache persistence backends.

use crate::error::CacheResult;
use std::fs;
use std::path::{Path, PathBuf};

/// A persistence backend for the local cache.
///
/// Backends are **opaque snapshot stores**: the cache hands them one encoded
/// snapshot per save and expects the exact same bytes back on the next load.
/// Backends do not interpret the snapshot format.
///
/// # Invariants
///
/// - `load` after a successful `save` returns the saved bytes
/// - `save` is all-or-nothing: a failed save leaves the previous snapshot
///   readable
/// - `wipe` removes any stored snapshot; a following `load` returns `None`
pub trait CacheBackend: Send + Sync {
    /// Loads the current snapshot, or `None` if nothing was ever saved.
    fn load(&self) -> CacheResult<Option<Vec<u8>>>;

    /// Atomically replaces the stored snapshot.
    fn save(&mut self, bytes: &[u8]) -> CacheResult<()>;

    /// Removes the stored snapshot.
    fn wipe(&mut self) -> CacheResult<()>;
}

/// An in-memory backend for tests and ephemeral caches.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: Option<Vec<u8>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-loaded with a snapshot.
    ///
    /// Useful for testing reopen scenarios.
    #[must_use]
    pub fn with_snapshot(bytes: Vec<u8>) -> Self {
        Self {
            snapshot: Some(bytes),
        }
    }

    /// Returns a copy of the stored snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<u8>> {
        self.snapshot.clone()
    }
}

impl CacheBackend for MemoryBackend {
    fn load(&self) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.snapshot.clone())
    }

    fn save(&mut self, bytes: &[u8]) -> CacheResult<()> {
        self.snapshot = Some(bytes.to_vec());
        Ok(())
    }

    fn wipe(&mut self) -> CacheResult<()> {
        self.snapshot = None;
        Ok(())
    }
}

/// A file-backed snapshot store.
///
/// Saves write to a sibling temp file and rename over the target, so a crash
/// mid-save leaves the previous snapshot intact.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend storing its snapshot at `path`.
    ///
    /// Parent directories are created on the first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the snapshot path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}

impl CacheBackend for FileBackend {
    fn load(&self) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, bytes: &[u8]) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.temp_path();
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn wipe(&mut self) -> CacheResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_empty_load() {
        let backend = MemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_save_and_load() {
        let mut backend = MemoryBackend::new();
        backend.save(b"snapshot").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"snapshot");
    }

    #[test]
    fn memory_wipe() {
        let mut backend = MemoryBackend::new();
        backend.save(b"snapshot").unwrap();
        backend.wipe().unwrap();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_with_snapshot() {
        let backend = MemoryBackend::with_snapshot(b"preloaded".to_vec());
        assert_eq!(backend.load().unwrap().unwrap(), b"preloaded");
    }

    #[test]
    fn file_missing_load_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("cache.json"));
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn file_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("cache.json"));

        backend.save(b"first").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"first");

        backend.save(b"second").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"second");
    }

    #[test]
    fn file_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("nested/deeper/cache.json"));

        backend.save(b"data").unwrap();
        assert_eq!(backend.load().unwrap().unwrap(), b"data");
    }

    #[test]
    fn file_wipe_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("cache.json"));

        backend.save(b"data").unwrap();
        backend.wipe().unwrap();
        assert!(backend.load().unwrap().is_none());

        // Wiping a missing snapshot is fine
        backend.wipe().unwrap();
    }

    #[test]
    fn file_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new(dir.path().join("cache.json"));
        backend.save(b"data").unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }
}
