//! Key-value store abstraction.
//!
//! The report core only needs atomic single-key put/get/delete plus a
//! listable key namespace; there are no multi-key transactions. All
//! operations are blocking. Callers needing timeouts wrap at the store
//! client level.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use walkdir::WalkDir;

use crate::config::WRITE_KEY_SEPARATOR;
use crate::error::{Result, VantageError};

pub trait KeyValueStore: Send + Sync {
    /// Fetch the value for a key. Missing keys are a [`VantageError::NotFound`].
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store a value, replacing any previous value for the key.
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. Deleting a missing key is a no-op.
    fn delete(&self, key: &str) -> Result<()>;

    /// List every key in the store.
    fn keys(&self) -> Result<Vec<String>>;

    fn contains(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(VantageError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| VantageError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| VantageError::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }
}

/// Filesystem-backed store. `/`-separated key components map to
/// subdirectories under the root; values are plain files.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(VantageError::InvalidKey("empty key".to_string()));
        }
        let mut path = self.root.clone();
        for component in key.split(WRITE_KEY_SEPARATOR) {
            if component.is_empty() || component == "." || component == ".." {
                return Err(VantageError::InvalidKey(key.to_string()));
            }
            path.push(component);
        }
        Ok(path)
    }
}

impl KeyValueStore for FsStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Err(VantageError::NotFound(key.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| VantageError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent)?;

        let file_name = path
            .file_name()
            .and_then(|x| x.to_str())
            .ok_or_else(|| VantageError::InvalidKey(key.to_string()))?;
        let tmp_name = format!(".{file_name}.vantage.tmp.{}", uuid::Uuid::new_v4().simple());
        let tmp_path = parent.join(tmp_name);

        {
            let mut tmp = fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&tmp_path)?;
            tmp.write_all(value)?;
            tmp.sync_all()?;
        }

        if let Err(err) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(VantageError::from(err));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(VantageError::from(err)),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for item in WalkDir::new(&self.root).follow_links(false) {
            let item = item.map_err(|e| VantageError::Validation(e.to_string()))?;
            if !item.file_type().is_file() {
                continue;
            }
            if item.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let relative = item
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| VantageError::Validation(e.to_string()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push(key);
        }
        out.sort();
        Ok(out)
    }

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.resolve(key)?.is_file())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        store.put("a/b/c", b"payload").expect("put");
        assert_eq!(store.get("a/b/c").expect("get"), b"payload");
        assert!(store.contains("a/b/c").expect("contains"));

        store.delete("a/b/c").expect("delete");
        let err = store.get("a/b/c").expect_err("must be gone");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn memory_store_delete_of_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.delete("nope").expect("noop delete");
    }

    #[test]
    fn fs_store_roundtrip_and_listing() {
        let temp = tempdir().expect("tempdir");
        let store = FsStore::open(temp.path()).expect("open");

        store.put("nightly/run1/report.json", b"{}").expect("put");
        store.put("nightly/index", b"[]").expect("put index");

        assert_eq!(store.get("nightly/index").expect("get"), b"[]");
        assert_eq!(
            store.keys().expect("keys"),
            vec![
                "nightly/index".to_string(),
                "nightly/run1/report.json".to_string()
            ]
        );

        store.delete("nightly/index").expect("delete");
        assert!(!store.contains("nightly/index").expect("contains"));
        store.delete("nightly/index").expect("second delete is noop");
    }

    #[test]
    fn fs_store_rejects_traversal_components() {
        let temp = tempdir().expect("tempdir");
        let store = FsStore::open(temp.path()).expect("open");
        let err = store.put("../escape", b"x").expect_err("must fail");
        assert_eq!(err.code(), "INVALID_KEY");
        let err = store.get("a//b").expect_err("must fail");
        assert_eq!(err.code(), "INVALID_KEY");
    }

    #[test]
    fn fs_store_put_replaces_existing_value() {
        let temp = tempdir().expect("tempdir");
        let store = FsStore::open(temp.path()).expect("open");
        store.put("k", b"v1").expect("put v1");
        store.put("k", b"v2").expect("put v2");
        assert_eq!(store.get("k").expect("get"), b"v2");
    }
}
