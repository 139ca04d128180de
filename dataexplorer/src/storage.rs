//! Local key/value persistence for projects.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::trace;
use parking_lot::Mutex;

use crate::fs::{ensure_path_exists, maybe_read_to_string, write_file};
use crate::Error;

/// A simple, synchronous string key/value store, analogous to a browser's
/// local storage.
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under the given key, if any.
    fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Store the given value under the given key, replacing any previous
    /// value.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Remove the value stored under the given key. Returns whether a value
    /// was present.
    fn remove(&self, key: &str) -> Result<bool, Error>;

    /// All of the keys currently in the store, in sorted order.
    fn keys(&self) -> Result<Vec<String>, Error>;

    fn contains_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }
}

/// An in-memory key/value store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of entries in the store.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        trace!("Storing {} bytes under {}", value.len(), key);
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.lock().remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn contains_key(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.lock().contains_key(key))
    }
}

const FILE_STORE_EXT: &str = "json";

/// A key/value store that keeps one `<key>.json` file per key in a single
/// directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (and create, if necessary) the store rooted at the given
    /// directory.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        ensure_path_exists(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        if !is_valid_key(key) {
            return Err(Error::InvalidStorageKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", key, FILE_STORE_EXT)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        maybe_read_to_string(self.path_for(key)?)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let path = self.path_for(key)?;
        trace!("Writing {} bytes to {}", value.len(), path.display());
        write_file(path, value)
    }

    fn remove(&self, key: &str) -> Result<bool, Error> {
        let path = self.path_for(key)?;
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| Error::Io(format!("removing {}", path.display()), e))?;
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, Error> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| Error::Io(format!("listing {}", self.dir.display()), e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::Io(format!("listing {}", self.dir.display()), e))?
                .path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(FILE_STORE_EXT)
            {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn memory_store_basics() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert!(store.contains_key("b").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "dataexplorer-file-store-{}",
            crate::hash::sha256(format!("{:?}", std::time::SystemTime::now()))
        ));
        let store = FileStore::open(&dir).unwrap();
        assert!(store.get("dataexplorer-1").unwrap().is_none());
        store.set("dataexplorer-1", "{}").unwrap();
        store.set("other", "x").unwrap();
        assert_eq!(store.get("dataexplorer-1").unwrap().as_deref(), Some("{}"));
        assert_eq!(store.keys().unwrap(), vec!["dataexplorer-1", "other"]);
        assert!(store.remove("other").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["dataexplorer-1"]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn file_store_rejects_unsafe_keys() {
        let store = FileStore {
            dir: PathBuf::from("unused"),
        };
        assert!(matches!(
            store.get("../etc/passwd"),
            Err(Error::InvalidStorageKey(_))
        ));
        assert!(matches!(store.set("", "x"), Err(Error::InvalidStorageKey(_))));
    }
}
