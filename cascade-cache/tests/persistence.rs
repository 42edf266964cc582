//! End-to-end tests for the file-backed persistence path: write-through
//! on insert, key encoding on disk, and hydration into a fresh cache.

use cascade_cache::{
    expansion_key, BranchSet, CacheName, CascadeCache, FileStore, NodeNarrative,
    PersistenceStore,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn branch_set(tag: &str) -> BranchSet {
    BranchSet {
        consequences: vec![
            format!("{tag} c1"),
            format!("{tag} c2"),
            format!("{tag} c3"),
        ],
        responses: vec![format!("{tag} r1"), format!("{tag} r2")],
    }
}

/// Inserts persist in the background; poll until the write lands.
async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}

async fn wait_for_narrative_len(store: &FileStore, expected: usize) {
    for _ in 0..100 {
        if let Ok(loaded) = store.load_all().await {
            if loaded.narrative.len() == expected {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("narrative cache never reached {expected} persisted entries");
}

#[tokio::test]
async fn test_insert_survives_restart() {
    let dir = TempDir::new().unwrap();
    let key = expansion_key(
        "Fuel Rationing",
        &["Energy Crisis".to_string()],
        Some("Chile"),
    );

    {
        let caches = CascadeCache::new(Arc::new(FileStore::new(dir.path())));
        caches.hydrate().await;
        caches
            .expansion()
            .insert(key.clone(), branch_set("fuel"))
            .await;

        let file = dir.path().join("expansion.json");
        wait_until(|| file.exists()).await;
    }

    // Fresh cache over the same directory sees the entry under the
    // original logical key.
    let caches = CascadeCache::new(Arc::new(FileStore::new(dir.path())));
    caches.hydrate().await;
    assert_eq!(caches.expansion().get(&key).await, Some(branch_set("fuel")));
}

#[tokio::test]
async fn test_keys_are_encoded_on_disk() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));

    // A label full of storage-hostile characters.
    let key = expansion_key("Black/Grey $Markets v1.0", &[], None);
    store
        .save(
            CacheName::Expansion,
            &key,
            serde_json::to_value(branch_set("bm")).unwrap(),
        )
        .await
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("expansion.json")).unwrap();
    assert!(!raw.contains("Black/Grey"));
    assert!(raw.contains("__slash__"));
    assert!(raw.contains("__dollar__"));

    // The logical key comes back intact through load_all.
    let loaded = store.load_all().await.unwrap();
    assert!(loaded.expansion.contains_key(&key));
}

#[tokio::test]
async fn test_removal_reaches_disk() {
    let dir = TempDir::new().unwrap();

    let narrative = NodeNarrative {
        context: "ctx".to_string(),
        reflections: vec!["a".into(), "b".into(), "c".into()],
        affected_entities: vec![],
    };
    {
        let caches = CascadeCache::new(Arc::new(FileStore::new(dir.path())));
        caches.hydrate().await;
        caches
            .narrative()
            .insert("Port Closure".to_string(), narrative.clone())
            .await;
        caches
            .narrative()
            .insert("Bank Run".to_string(), narrative)
            .await;

        let store = FileStore::new(dir.path());
        wait_for_narrative_len(&store, 2).await;

        caches.narrative().remove("Port Closure").await;
        wait_for_narrative_len(&store, 1).await;
    }

    let caches = CascadeCache::new(Arc::new(FileStore::new(dir.path())));
    caches.hydrate().await;
    assert!(caches.narrative().get("Port Closure").await.is_none());
    assert!(caches.narrative().get("Bank Run").await.is_some());
}

#[tokio::test]
async fn test_concurrent_inserts_all_reach_disk() {
    let dir = TempDir::new().unwrap();
    let caches = Arc::new(CascadeCache::new(Arc::new(FileStore::new(dir.path()))));
    caches.hydrate().await;

    // Each insert spawns its own background write; the saves race.
    let inserts: Vec<_> = (0..20)
        .map(|i| {
            let caches = Arc::clone(&caches);
            tokio::spawn(async move {
                let key = expansion_key(&format!("Effect {i}"), &[], Some("Chile"));
                caches.expansion().insert(key, branch_set(&format!("e{i}"))).await;
            })
        })
        .collect();
    for insert in inserts {
        insert.await.unwrap();
    }

    let store = FileStore::new(dir.path());
    for _ in 0..100 {
        // A torn document would fail load_all here instead of settling.
        if let Ok(loaded) = store.load_all().await {
            if loaded.expansion.len() == 20 {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expansion cache never settled at 20 persisted entries");
}

#[tokio::test]
async fn test_corrupt_cache_file_degrades_to_cold_start() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("expansion.json"), "not json").unwrap();

    let caches = CascadeCache::new(Arc::new(FileStore::new(dir.path())));
    caches.hydrate().await;
    assert!(caches.is_hydrated());
    assert!(caches.expansion().is_empty().await);
}

#[tokio::test]
async fn test_unwritable_persistence_never_blocks_the_cache() {
    // Point the store at a path that cannot be a directory.
    let dir = TempDir::new().unwrap();
    let bogus = dir.path().join("file");
    std::fs::write(&bogus, "x").unwrap();
    let caches = CascadeCache::new(Arc::new(FileStore::new(bogus.join("sub"))));

    caches.hydrate().await;
    caches
        .expansion()
        .insert("k".to_string(), branch_set("a"))
        .await;

    // In-memory operation succeeded regardless of the doomed write.
    assert_eq!(caches.expansion().get("k").await, Some(branch_set("a")));
}
