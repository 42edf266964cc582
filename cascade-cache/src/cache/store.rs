//! In-memory content caches with best-effort persistence sync
//!
//! Each [`ContentCache`] is a typed map guarded by an async `RwLock`.
//! Mutations additionally fire a non-blocking write to the persistence
//! store: a persistence failure is logged and never reaches the caller,
//! so the in-memory operation always succeeds.
//!
//! [`CascadeCache`] bundles the three caches of the system and owns the
//! hydrate-once lifecycle: the first `hydrate` call loads all three maps
//! from the persistence store; until it completes, lookups behave as
//! misses and callers fall through to generation. That window is an
//! accepted race, not a correctness bug, because results are still cached
//! going forward.

use crate::cache::types::CacheStats;
use crate::content::{BranchSet, NodeNarrative, SeverityScore};
use crate::persist::{CacheName, PersistenceStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Internal cache storage
struct CacheInner<T> {
    entries: HashMap<String, T>,
    stats: CacheStats,
}

/// One typed content cache with write-through persistence.
pub struct ContentCache<T> {
    name: CacheName,
    inner: Arc<RwLock<CacheInner<T>>>,
    persistence: Arc<dyn PersistenceStore>,
}

impl<T> ContentCache<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(name: CacheName, persistence: Arc<dyn PersistenceStore>) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(CacheInner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            })),
            persistence,
        }
    }

    /// Get a value from the cache.
    pub async fn get(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.write().await;
        if let Some(value) = inner.entries.get(key) {
            let value = value.clone();
            inner.stats.hits += 1;
            debug!("Cache hit [{}]: {}", self.name, key);
            Some(value)
        } else {
            inner.stats.misses += 1;
            debug!("Cache miss [{}]: {}", self.name, key);
            None
        }
    }

    /// Insert or overwrite a value, then persist it in the background.
    pub async fn insert(&self, key: String, value: T) {
        {
            let mut inner = self.inner.write().await;
            inner.entries.insert(key.clone(), value.clone());
            inner.stats.entries = inner.entries.len();
        }
        self.persist_entry(key, value);
    }

    /// Remove a single entry, mirrored to persistence in the background.
    pub async fn remove(&self, key: &str) -> Option<T> {
        let removed = {
            let mut inner = self.inner.write().await;
            let removed = inner.entries.remove(key);
            if removed.is_some() {
                inner.stats.entries = inner.entries.len();
                inner.stats.invalidations += 1;
            }
            removed
        };

        if removed.is_some() {
            let persistence = Arc::clone(&self.persistence);
            let name = self.name;
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(e) = persistence.remove(name, &key).await {
                    warn!("Persistence remove failed [{}] {}: {}", name, key, e);
                }
            });
        }
        removed
    }

    /// Clear all entries, mirrored to persistence in the background.
    pub async fn clear(&self) {
        let count = {
            let mut inner = self.inner.write().await;
            let count = inner.entries.len();
            inner.entries.clear();
            inner.stats.entries = 0;
            inner.stats.invalidations += count as u64;
            count
        };
        info!("Cleared {} entries from {} cache", count, self.name);

        let persistence = Arc::clone(&self.persistence);
        let name = self.name;
        tokio::spawn(async move {
            if let Err(e) = persistence.clear(name).await {
                warn!("Persistence clear failed [{}]: {}", name, e);
            }
        });
    }

    /// Check for a key without touching the hit/miss counters.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.inner.read().await.entries.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.read().await.stats.clone()
    }

    /// Populate entries from persisted JSON values. Entries that fail to
    /// deserialize are skipped with a warning; no persistence writes are
    /// triggered.
    pub async fn hydrate_from(&self, map: HashMap<String, serde_json::Value>) {
        let mut inner = self.inner.write().await;
        for (key, raw) in map {
            match serde_json::from_value::<T>(raw) {
                Ok(value) => {
                    inner.entries.insert(key, value);
                }
                Err(e) => {
                    warn!("Skipping corrupt {} cache entry {}: {}", self.name, key, e);
                }
            }
        }
        inner.stats.entries = inner.entries.len();
    }

    /// Fire-and-forget persistence write. Serialization or store failures
    /// are logged, never surfaced.
    fn persist_entry(&self, key: String, value: T) {
        let json = match serde_json::to_value(&value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize {} cache entry {}: {}", self.name, key, e);
                return;
            }
        };

        let persistence = Arc::clone(&self.persistence);
        let name = self.name;
        tokio::spawn(async move {
            if let Err(e) = persistence.save(name, &key, json).await {
                warn!("Persistence write failed [{}] {}: {}", name, key, e);
            }
        });
    }
}

/// The three independent content caches of the cascade engine.
pub struct CascadeCache {
    narrative: ContentCache<NodeNarrative>,
    severity: ContentCache<Vec<SeverityScore>>,
    expansion: ContentCache<BranchSet>,
    persistence: Arc<dyn PersistenceStore>,
    hydration: OnceCell<()>,
}

impl CascadeCache {
    pub fn new(persistence: Arc<dyn PersistenceStore>) -> Self {
        Self {
            narrative: ContentCache::new(CacheName::Narrative, Arc::clone(&persistence)),
            severity: ContentCache::new(CacheName::Severity, Arc::clone(&persistence)),
            expansion: ContentCache::new(CacheName::Expansion, Arc::clone(&persistence)),
            persistence,
            hydration: OnceCell::new(),
        }
    }

    /// Narrative cache, keyed on label alone.
    pub fn narrative(&self) -> &ContentCache<NodeNarrative> {
        &self.narrative
    }

    /// Severity cache, keyed on label alone.
    pub fn severity(&self) -> &ContentCache<Vec<SeverityScore>> {
        &self.severity
    }

    /// Expansion cache, keyed on (label, ancestor chain, country).
    pub fn expansion(&self) -> &ContentCache<BranchSet> {
        &self.expansion
    }

    /// Load all three caches from persistence, at most once per cache
    /// lifetime. Racing callers await the same load. A load failure
    /// degrades to empty caches (cold start) and is logged.
    pub async fn hydrate(&self) {
        self.hydration
            .get_or_init(|| async {
                match self.persistence.load_all().await {
                    Ok(loaded) => {
                        self.narrative.hydrate_from(loaded.narrative).await;
                        self.severity.hydrate_from(loaded.severity).await;
                        self.expansion.hydrate_from(loaded.expansion).await;
                        info!(
                            narrative = self.narrative.len().await,
                            severity = self.severity.len().await,
                            expansion = self.expansion.len().await,
                            "Hydrated caches from persistence"
                        );
                    }
                    Err(e) => {
                        warn!("Cache hydration failed, starting cold: {}", e);
                    }
                }
            })
            .await;
    }

    /// Whether hydration has completed (successfully or degraded).
    pub fn is_hydrated(&self) -> bool {
        self.hydration.initialized()
    }

    /// Clear all three caches, in memory and in persistence.
    pub async fn clear_all(&self) {
        self.narrative.clear().await;
        self.severity.clear().await;
        self.expansion.clear().await;
    }
}
