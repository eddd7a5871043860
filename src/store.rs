//! Key-value persistence for capture records.
//!
//! One capture is kept under `CAPTURED_BOARD_KEY`; a successful capture
//! overwrites it, a failed one never touches the store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Key the latest capture is stored under.
pub const CAPTURED_BOARD_KEY: &str = "capturedBoard";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store file {path} is not a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid JSON value: {0}")]
    Json(#[source] serde_json::Error),
}

#[allow(async_fn_in_trait)]
pub trait KeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Drops every key.
    async fn clear(&self) -> Result<(), StoreError>;
}

// *************** JSON file ***************

/// All keys in one JSON object on disk. Writes go to a sibling temp file that
/// is renamed over the original, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io { path: self.path.clone(), source }
    }

    async fn load(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Corrupt { path: self.path.clone(), source })
    }

    async fn save(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(map).map_err(StoreError::Json)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json).await.map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), keys = map.len(), "store written");
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.save(&Map::new()).await
    }
}

// *************** In memory ***************

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.entries().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("store.json"));

        assert_eq!(store.get(CAPTURED_BOARD_KEY).await.unwrap(), None);
        store.set(CAPTURED_BOARD_KEY, json!({ "fen": "x" })).await.unwrap();
        store.set("authToken", json!("t")).await.unwrap();

        // A fresh handle sees what the first one wrote
        let reopened = JsonFileStore::new(store.path());
        assert_eq!(reopened.get(CAPTURED_BOARD_KEY).await.unwrap(), Some(json!({ "fen": "x" })));

        reopened.remove("authToken").await.unwrap();
        assert_eq!(store.get("authToken").await.unwrap(), None);
        assert!(store.get(CAPTURED_BOARD_KEY).await.unwrap().is_some());

        store.clear().await.unwrap();
        assert_eq!(store.get(CAPTURED_BOARD_KEY).await.unwrap(), None);
        assert!(!dir.path().join("nested").join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_reports_corrupt_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[1, 2").unwrap();
        let store = JsonFileStore::new(file.path());
        assert!(matches!(store.get("k").await, Err(StoreError::Corrupt { .. })));
        assert!(store.set("k", json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));
        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.clear().await.unwrap();
        assert!(store.is_empty());
    }
}
