// nomadbase-core/src/storage/file_storage.rs
//! File-backed collaborators
//!
//! `FileBlobStore` keeps one JSON file per collection bundle under a root
//! directory; `FileKeyValueStore` keeps a single JSON map file. Writes go
//! through a temp file + rename so a crashed run never leaves a
//! half-written blob behind for the next run to trip over.

use super::traits::{BlobMetadata, BlobStore, KeyValueStore};
use super::DocumentBundle;
use crate::error::{NomadError, Result};
use crate::log_trace;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `contents` to `path` via a sibling temp file and atomic rename
fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

// ============================================================================
// BLOB STORE
// ============================================================================

/// Blob store rooted at a directory; locators are root-relative paths
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) a blob store rooted at `root`
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(FileBlobStore {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn resolve(&self, locator: &str) -> PathBuf {
        self.root.join(locator)
    }
}

impl BlobStore for FileBlobStore {
    fn read_file(&self, locator: &str) -> Result<DocumentBundle> {
        let path = self.resolve(locator);
        let contents = fs::read_to_string(&path)
            .map_err(|e| NomadError::Storage(format!("cannot read blob '{}': {}", locator, e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| NomadError::Storage(format!("malformed bundle at '{}': {}", locator, e)))
    }

    fn write_file(&self, locator: &str, bundle: &DocumentBundle) -> Result<()> {
        let path = self.resolve(locator);
        if !path.exists() {
            return Err(NomadError::Storage(format!(
                "cannot write missing blob '{}'",
                locator
            )));
        }
        let contents = serde_json::to_string(bundle)?;
        log_trace!("writing bundle '{}' ({} bytes)", locator, contents.len());
        write_atomically(&path, &contents)
    }

    fn create_file(&self, name: &str, bundle: &DocumentBundle, container: &str) -> Result<String> {
        let dir = self.root.join(container);
        fs::create_dir_all(&dir)?;

        let locator = format!("{}/{}.json", container, name);
        let path = self.resolve(&locator);
        if path.exists() {
            return Err(NomadError::Storage(format!(
                "blob '{}' already exists",
                locator
            )));
        }

        let contents = serde_json::to_string(bundle)?;
        write_atomically(&path, &contents)?;
        Ok(locator)
    }

    fn file_exists(&self, locator: &str) -> bool {
        self.resolve(locator).is_file()
    }

    fn get_metadata(&self, locator: &str) -> Result<BlobMetadata> {
        let path = self.resolve(locator);
        let meta = fs::metadata(&path)
            .map_err(|e| NomadError::Storage(format!("cannot stat blob '{}': {}", locator, e)))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Utc::now());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| locator.to_string());

        Ok(BlobMetadata {
            id: locator.to_string(),
            name,
            modified_time: modified,
            size: meta.len(),
        })
    }

    fn delete_file(&self, locator: &str) -> Result<()> {
        let path = self.resolve(locator);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }
}

// ============================================================================
// KEY-VALUE STORE
// ============================================================================

/// Durable key-value store backed by one JSON map file.
///
/// The whole map is loaded and rewritten per operation. That is fine: the
/// store holds exactly one coordination value (the master index), and the
/// Mutex only serializes callers within one process - cross-run safety
/// comes from the advisory lock protocol, not from here.
pub struct FileKeyValueStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl FileKeyValueStore {
    /// Open (creating parent directories if needed) the store at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(FileKeyValueStore {
            path: path.as_ref().to_path_buf(),
            io: Mutex::new(()),
        })
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| NomadError::Storage(format!("cannot read key-value store: {}", e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| NomadError::Storage(format!("malformed key-value store: {}", e)))
    }

    fn save(&self, map: &HashMap<String, String>) -> Result<()> {
        let contents = serde_json::to_string(map)?;
        write_atomically(&self.path, &contents)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.io.lock();
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.io.lock();
        let mut map = self.load()?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.io.lock();
        let mut map = self.load()?;
        if map.remove(key).is_some() {
            self.save(&map)?;
        }
        Ok(())
    }
}
