use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::events::IndexMeta;
use super::IndexData;

/// Durable string key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        (**self).set(key, value)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let values = self.values.read().map_err(|e| e.to_string())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut values = self.values.write().map_err(|e| e.to_string())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory (e.g. `<vault>/.notology`)
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, String> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .map_err(|e| format!("Failed to create {:?}: {}", self.dir, e))?;
        }
        atomic_write_file(&self.path_for(key), value.as_bytes())
    }
}

/// Write to a sibling temp file, then rename over the target so readers
/// (and sync tools) never see a half-written file.
fn atomic_write_file(path: &Path, content: &[u8]) -> Result<(), String> {
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let temp_path = path.with_file_name(format!("{}.tmp", file_name));

    let mut file = fs::File::create(&temp_path)
        .map_err(|e| format!("Failed to create temp file {:?}: {}", temp_path, e))?;
    file.write_all(content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;
    file.sync_all()
        .map_err(|e| format!("Failed to sync temp file {:?}: {}", temp_path, e))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} -> {:?}: {}", temp_path, path, e))
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    index: &'a IndexData,
    meta: &'a IndexMeta,
}

#[derive(Deserialize)]
struct PersistedIndex {
    index: IndexData,
    meta: IndexMeta,
}

/// Saves and restores `{index, meta}` as one JSON blob under a fixed key
pub struct IndexPersistence {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl IndexPersistence {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Never fails the caller: errors are logged and reported as `false`
    pub fn save(&self, index: &IndexData, meta: &IndexMeta) -> bool {
        let json = match serde_json::to_string(&PersistedIndexRef { index, meta }) {
            Ok(json) => json,
            Err(e) => {
                log::error!("[IndexPersistence] Failed to serialize index: {}", e);
                return false;
            }
        };

        match self.store.set(&self.key, &json) {
            Ok(()) => true,
            Err(e) => {
                log::error!("[IndexPersistence] Failed to save index: {}", e);
                false
            }
        }
    }

    /// `None` on a missing key, unreadable blob or shape mismatch
    pub fn load(&self) -> Option<(IndexData, IndexMeta)> {
        let json = match self.store.get(&self.key) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("[IndexPersistence] Failed to read index: {}", e);
                return None;
            }
        };

        let value: serde_json::Value = match serde_json::from_str(&json) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("[IndexPersistence] Stored index is not valid JSON: {}", e);
                return None;
            }
        };

        if value.get("index").is_none() || value.get("meta").is_none() {
            log::warn!("[IndexPersistence] Stored index is missing 'index' or 'meta'");
            return None;
        }

        match serde_json::from_value::<PersistedIndex>(value) {
            Ok(persisted) => Some((persisted.index, persisted.meta)),
            Err(e) => {
                log::warn!("[IndexPersistence] Stored index has an unexpected shape: {}", e);
                None
            }
        }
    }
}

/// Stale when never indexed or older than `max_age_ms`.
///
/// A non-positive `last_indexed` (unset or corrupted) counts as never indexed.
pub fn is_stale(meta: &IndexMeta, now_ms: i64, max_age_ms: i64) -> bool {
    meta.last_indexed <= 0 || now_ms.saturating_sub(meta.last_indexed) > max_age_ms
}
