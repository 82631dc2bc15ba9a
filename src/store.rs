//! Persistent key/value storage for session state.
//!
//! `FileStore` re-reads its file on every access, so several `orchid`
//! processes sharing one session file see each other's logins and logouts on
//! their next read. There is no locking; the last writer wins.

use anyhow::{Context as _, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

pub const KEY_AUTH_TOKEN: &str = "authToken";
pub const KEY_IS_AUTHENTICATED: &str = "isAuthenticated";
pub const KEY_USERNAME: &str = "username";
pub const KEY_USER_ROLE: &str = "userRole";
pub const KEY_USER_ROLE_NAME: &str = "userRoleName";
pub const KEY_USER_ID: &str = "userId";

/// Every key cleared on logout or detected expiry
pub const SESSION_KEYS: &[&str] = &[
    KEY_IS_AUTHENTICATED,
    KEY_USERNAME,
    KEY_AUTH_TOKEN,
    KEY_USER_ROLE,
    KEY_USER_ROLE_NAME,
    KEY_USER_ID,
];

/// Storage backend for session state
pub trait SessionStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process storage, lost on exit
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON object on disk, shared by every process pointed at the same path
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store. A corrupt one is reported and read as
    /// empty so the client falls back to anonymous.
    fn read_entries(&self) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("cannot read session file {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("ignoring corrupt session file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    /// Write to a temporary file beside the session file, then rename it
    /// over the old one. Readers never see a truncated file.
    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.exists() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating session directory {}", dir.display()))?;
        }

        let content = serde_json::to_string_pretty(entries)?;
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temporary file in {}", dir.display()))?;
        tmp.write_all(content.as_bytes())
            .with_context(|| format!("writing session file {}", self.path.display()))?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing session file {}", self.path.display()))?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_entries().remove(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.read_entries();
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let mut entries = self.read_entries();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert!(store.get(KEY_AUTH_TOKEN).is_none());
        store.set(KEY_AUTH_TOKEN, "abc").unwrap();
        assert_eq!(store.get(KEY_AUTH_TOKEN).as_deref(), Some("abc"));
        store.remove(KEY_AUTH_TOKEN).unwrap();
        assert!(store.get(KEY_AUTH_TOKEN).is_none());
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let mut store = FileStore::new(&path);

        store.set(KEY_USERNAME, "alice").unwrap();
        assert!(path.exists());
        assert_eq!(store.get(KEY_USERNAME).as_deref(), Some("alice"));
    }

    #[test]
    fn test_file_store_shared_between_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut first = FileStore::new(&path);
        let mut second = FileStore::new(&path);

        first.set(KEY_AUTH_TOKEN, "t1").unwrap();
        assert_eq!(second.get(KEY_AUTH_TOKEN).as_deref(), Some("t1"));

        second.remove(KEY_AUTH_TOKEN).unwrap();
        assert!(first.get(KEY_AUTH_TOKEN).is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = FileStore::new(&path);
        assert!(store.get(KEY_AUTH_TOKEN).is_none());

        // the next write replaces the corrupt content
        store.set(KEY_USERNAME, "bob").unwrap();
        assert_eq!(store.get(KEY_USERNAME).as_deref(), Some("bob"));
    }

    #[test]
    fn test_file_store_remove_missing_key_does_not_create_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileStore::new(&path);
        store.remove(KEY_USER_ID).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut store = FileStore::new(&path);
        store.set(KEY_AUTH_TOKEN, "first").unwrap();
        store.set(KEY_AUTH_TOKEN, "second").unwrap();
        store.set(KEY_USERNAME, "carol").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["session.json".to_string()]);

        let on_disk: BTreeMap<String, String> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.get(KEY_AUTH_TOKEN).map(String::as_str), Some("second"));
        assert_eq!(on_disk.len(), 2);
    }
}
