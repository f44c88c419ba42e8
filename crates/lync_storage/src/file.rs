//! File-based store for persistent storage.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_key, PersistedStore};
use parking_lot::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A directory-backed store holding one file per key.
///
/// Values survive process restarts.
///
/// # Durability
///
/// `set` writes the value to a hidden temporary file, calls
/// `File::sync_all()`, then renames it over the key's file. A crash at any
/// point leaves either the previous value or the new one, never a torn mix.
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
/// Internal locking serializes writers.
///
/// # Example
///
/// ```no_run
/// use lync_storage::{FileStore, PersistedStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("lync-data")).unwrap();
/// store.set("routes", b"[]").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Opens a store in `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or is not a
    /// directory.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        if !dir.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", dir.display()),
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            lock: RwLock::new(()),
        })
    }

    /// Returns the directory holding the store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.tmp"))
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> StorageResult<()> {
        File::open(&self.dir)?.sync_all()?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl PersistedStore for FileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let _guard = self.lock.read();

        match fs::read(self.value_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.lock.write();

        let temp = self.temp_path(key);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(value)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.value_path(key))?;
        self.sync_dir()
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        let _guard = self.lock.write();

        match fs::remove_file(self.value_path(key)) {
            Ok(()) => self.sync_dir(),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let _guard = self.lock.read();

        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            // Temporary files and anything foreign fail validation.
            if let Some(name) = entry.file_name().to_str() {
                if validate_key(name).is_ok() {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store");

        let store = FileStore::open(&path).unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert!(path.is_dir());
    }

    #[test]
    fn file_set_and_get() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("routes", b"[{\"id\":\"r1\"}]").unwrap();
        assert_eq!(
            store.get("routes").unwrap(),
            Some(b"[{\"id\":\"r1\"}]".to_vec())
        );
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();

        // Write data
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.set("lyncapp_event_queue", b"[]").unwrap();
        }

        // Reopen and read
        {
            let store = FileStore::open(dir.path()).unwrap();
            assert_eq!(
                store.get("lyncapp_event_queue").unwrap(),
                Some(b"[]".to_vec())
            );
        }
    }

    #[test]
    fn file_overwrite_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("routes", b"first").unwrap();
        store.set("routes", b"second").unwrap();

        assert_eq!(store.get("routes").unwrap(), Some(b"second".to_vec()));
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn file_keys_skip_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("b", b"").unwrap();
        store.set("a", b"").unwrap();
        fs::write(dir.path().join(".a.tmp"), b"partial").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn file_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set("routes", b"x").unwrap();
        store.remove("routes").unwrap();
        store.remove("routes").unwrap();
        assert_eq!(store.get("routes").unwrap(), None);
    }

    #[test]
    fn file_rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.set("../escape", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[test]
    fn file_open_on_regular_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain");
        fs::write(&path, b"").unwrap();

        assert!(FileStore::open(&path).is_err());
    }

    #[test]
    fn file_path() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.path(), dir.path());
    }
}
