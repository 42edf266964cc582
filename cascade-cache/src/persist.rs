//! Persistence boundary for the content caches
//!
//! The cache layer talks to external storage through [`PersistenceStore`]:
//! a bulk load at startup and best-effort single-key writes afterwards.
//! Logical keys are encoded with [`crate::codec`] before they become storage
//! paths and decoded back on load, so the in-memory maps always hold logical
//! keys.
//!
//! Persistence failures never propagate past this boundary's callers: the
//! cache logs them and carries on with its in-memory state.

use crate::codec;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Names of the three content caches, used as storage namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheName {
    /// Node narrative payloads (context, reflections, affected entities)
    Narrative,
    /// Severity score lists
    Severity,
    /// Expansion results (consequence/response label sets)
    Expansion,
}

impl CacheName {
    /// Storage file/collection name for this cache.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheName::Narrative => "narrative",
            CacheName::Severity => "severity",
            CacheName::Expansion => "expansion",
        }
    }
}

impl fmt::Display for CacheName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// All three cache maps as loaded from storage, keys already decoded to
/// logical form, values still as raw JSON.
#[derive(Debug, Clone, Default)]
pub struct LoadedCaches {
    pub narrative: HashMap<String, serde_json::Value>,
    pub severity: HashMap<String, serde_json::Value>,
    pub expansion: HashMap<String, serde_json::Value>,
}

/// External persistence store for cache entries and the country setting.
///
/// `save` is best-effort: implementations report failures through the error
/// channel, but callers treat them as log-and-continue.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Load all three cache maps. Keys are returned in logical (decoded) form.
    async fn load_all(&self) -> Result<LoadedCaches>;

    /// Persist a single entry. `logical_key` is encoded before storage.
    async fn save(&self, cache: CacheName, logical_key: &str, value: serde_json::Value)
        -> Result<()>;

    /// Remove a single entry.
    async fn remove(&self, cache: CacheName, logical_key: &str) -> Result<()>;

    /// Remove every entry of one cache.
    async fn clear(&self, cache: CacheName) -> Result<()>;

    /// Persist the active country so it survives a process restart.
    async fn save_country(&self, country: Option<&str>) -> Result<()>;

    /// Load the persisted country, if any.
    async fn load_country(&self) -> Result<Option<String>>;
}

/// A store that persists nothing. Every load is a cold start.
#[derive(Debug, Clone, Default)]
pub struct NullStore;

#[async_trait]
impl PersistenceStore for NullStore {
    async fn load_all(&self) -> Result<LoadedCaches> {
        Ok(LoadedCaches::default())
    }

    async fn save(&self, _: CacheName, _: &str, _: serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _: CacheName, _: &str) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _: CacheName) -> Result<()> {
        Ok(())
    }

    async fn save_country(&self, _: Option<&str>) -> Result<()> {
        Ok(())
    }

    async fn load_country(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// File-backed store: one JSON document per cache under a base directory.
///
/// Storage keys are the encoded form of the logical keys, so labels with
/// path separators or wildcard characters are safe to persist.
///
/// Each document is rewritten whole on every save. Write paths take a
/// store-level lock and replace the document via a temp file and rename,
/// so concurrent save tasks cannot drop each other's entries and a reader
/// never observes a partially written file.
pub struct FileStore {
    base_dir: PathBuf,
    /// Serializes the read-modify-write cycle on the cache documents.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn cache_path(&self, cache: CacheName) -> PathBuf {
        self.base_dir.join(format!("{}.json", cache.as_str()))
    }

    fn country_path(&self) -> PathBuf {
        self.base_dir.join("country.json")
    }

    async fn read_map(&self, cache: CacheName) -> Result<HashMap<String, serde_json::Value>> {
        let path = self.cache_path(cache);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path).await?;
        let stored: HashMap<String, serde_json::Value> = serde_json::from_str(&content)?;

        // Decode storage keys back to logical keys
        Ok(stored
            .into_iter()
            .map(|(k, v)| (codec::decode(&k), v))
            .collect())
    }

    async fn write_map(
        &self,
        cache: CacheName,
        map: &HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let content = serde_json::to_string_pretty(map)?;
        self.write_atomic(&self.cache_path(cache), content).await
    }

    /// Write to a sibling temp file, then rename over the target.
    async fn write_atomic(&self, path: &Path, content: String) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for FileStore {
    async fn load_all(&self) -> Result<LoadedCaches> {
        let loaded = LoadedCaches {
            narrative: self.read_map(CacheName::Narrative).await?,
            severity: self.read_map(CacheName::Severity).await?,
            expansion: self.read_map(CacheName::Expansion).await?,
        };
        debug!(
            narrative = loaded.narrative.len(),
            severity = loaded.severity.len(),
            expansion = loaded.expansion.len(),
            "Loaded cache maps from {}",
            self.base_dir.display()
        );
        Ok(loaded)
    }

    async fn save(
        &self,
        cache: CacheName,
        logical_key: &str,
        value: serde_json::Value,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map: HashMap<String, serde_json::Value> = self
            .read_map(cache)
            .await?
            .into_iter()
            .map(|(k, v)| (codec::encode(&k), v))
            .collect();
        map.insert(codec::encode(logical_key), value);
        self.write_map(cache, &map).await
    }

    async fn remove(&self, cache: CacheName, logical_key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map: HashMap<String, serde_json::Value> = self
            .read_map(cache)
            .await?
            .into_iter()
            .map(|(k, v)| (codec::encode(&k), v))
            .collect();
        map.remove(&codec::encode(logical_key));
        self.write_map(cache, &map).await
    }

    async fn clear(&self, cache: CacheName) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_map(cache, &HashMap::new()).await
    }

    async fn save_country(&self, country: Option<&str>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let content = serde_json::to_string(&country)?;
        self.write_atomic(&self.country_path(), content).await
    }

    async fn load_country(&self) -> Result<Option<String>> {
        let path = self.country_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).await?;
        let country: Option<String> = serde_json::from_str(&content)
            .map_err(|e| CacheError::Persistence(format!("corrupt country file: {e}")))?;
        Ok(country)
    }
}
