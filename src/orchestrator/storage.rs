//! Key-value storage backends for session snapshots.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::errors::StorageError;

/// Byte-oriented key-value storage.
pub trait Storage: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous value atomically.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// All stored keys, sorted.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Keys become file names, so only a conservative character set is allowed.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !key.contains("..");
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// One JSON file per key under a directory.
///
/// Writes go to a hidden temp file in the same directory, are synced, then
/// renamed over the target so readers never observe a partial snapshot.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    const EXTENSION: &'static str = "json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(format!("{}.{}", key, Self::EXTENSION)))
    }

    fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write_temp(tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

impl Storage for FileStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root).map_err(Self::io_err(&self.root))?;

        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", key, Uuid::new_v4().simple()));
        if let Err(e) = Self::write_temp(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_err(&tmp)(e));
        }
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(Self::io_err(&path)(e));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(Self::io_err(&path)(e)),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.path_for(key)?.is_file())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(&self.root)(e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(Self::io_err(&self.root))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            let stem = path.file_stem().and_then(|s| s.to_str());
            if let Some(stem) = stem.filter(|s| validate_key(s).is_ok()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory storage for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.entries
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .contains_key(key))
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .keys()
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_put_get_overwrite() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("state"));

        assert!(!storage.exists("s1").unwrap());
        storage.put("s1", b"first").unwrap();
        storage.put("s1", b"second").unwrap();
        assert!(storage.exists("s1").unwrap());
        assert_eq!(storage.get("s1").unwrap(), b"second");
    }

    #[test]
    fn test_file_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.put("a", b"{}").unwrap();
        storage.put("b", b"{}").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_file_missing_key() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(storage.get("nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_keys_on_missing_root() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("never-created"));
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_keys_skip_foreign_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.put("good", b"{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join(".good.abc.tmp"), "x").unwrap();
        assert_eq!(storage.keys().unwrap(), vec!["good"]);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let storage = MemoryStorage::new();
        for key in ["", "../escape", ".hidden", "a/b", "x..y"] {
            assert!(
                matches!(storage.put(key, b""), Err(StorageError::InvalidKey(_))),
                "{key}"
            );
        }
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.put("b", b"2").unwrap();
        storage.put("a", b"1").unwrap();
        assert_eq!(storage.get("a").unwrap(), b"1");
        assert!(storage.exists("b").unwrap());
        assert_eq!(storage.keys().unwrap(), vec!["a", "b"]);
        assert!(matches!(storage.get("c"), Err(StorageError::NotFound(_))));
    }
}
