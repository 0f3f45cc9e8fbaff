//! Key-Value Storage Adapters
//!
//! - `InMemoryKeyValueStore`: process-local map for tests and development
//! - `FileKeyValueStore`: one JSON object on disk, rewritten atomically

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};

use crate::application::ports::{KeyValueStore, StorageError};

// =============================================================================
// In-Memory Store
// =============================================================================

/// In-memory implementation of `KeyValueStore`.
///
/// Contents are lost when the value is dropped. Share one instance between
/// two managers to simulate a restart.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    slots: RwLock<HashMap<String, String>>,
}

impl InMemoryKeyValueStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of written slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no slot was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.slots.write().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// =============================================================================
// File Store
// =============================================================================

/// JSON-file implementation of `KeyValueStore`.
///
/// All slots live in one JSON object. Every write rewrites the whole file
/// through a sibling temp file and a rename, so readers never observe a
/// partial document.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    slots: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file starts empty. An unreadable or corrupt file also
    /// starts empty and is overwritten on the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let slots = Self::load(&path);
        tracing::debug!(path = %path.display(), slots = slots.len(), "Opened state file");

        Ok(Self {
            path,
            slots: Mutex::new(slots),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> BTreeMap<String, String> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read state file");
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt state file");
            BTreeMap::new()
        })
    }

    fn flush(&self, slots: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let document = serde_json::to_vec_pretty(slots)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&document)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut slots = self.slots.lock();
        slots.insert(key.to_string(), value.to_string());
        self.flush(&slots)
    }
}
