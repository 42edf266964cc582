//! Graph state snapshot persistence
//!
//! The full node/link collection persists as a single JSON snapshot,
//! loaded once at startup (a non-empty snapshot supersedes building the
//! graph from scratch) and saved on a debounce: mutations schedule the
//! latest state, and the writer persists at most once per interval
//! instead of on every change. Write failures are logged and never
//! propagate.

use crate::error::{CascadeError, Result};
use crate::graph::node::{GraphLink, GraphNode};
use crate::graph::store::GraphStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Point-in-time capture of the whole graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub timestamp: DateTime<Utc>,
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl GraphSnapshot {
    pub fn capture(store: &GraphStore) -> Self {
        Self {
            timestamp: Utc::now(),
            nodes: store.nodes().cloned().collect(),
            links: store.links(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Rebuild a store from this snapshot. In-flight enrichment markers
    /// are normalized back to unfetched, and the snapshot must contain
    /// exactly one root with intact parentage.
    pub fn restore(self) -> Result<GraphStore> {
        let mut store = GraphStore::new();

        let mut root = None;
        let mut others = vec![];
        for mut node in self.nodes {
            node.memory = node.memory.normalized();
            node.severity = node.severity.normalized();
            if node.is_root() {
                if root.is_some() {
                    return Err(CascadeError::Structural(
                        "snapshot contains multiple roots".to_string(),
                    ));
                }
                root = Some(node);
            } else {
                others.push(node);
            }
        }

        let root = root.ok_or_else(|| {
            CascadeError::Structural("snapshot contains no root node".to_string())
        })?;
        store.init_root(root)?;

        // Insert shallowest-first so every parent precedes its children.
        others.sort_by_key(|n| n.depth);
        for node in others {
            let Some(parent_id) = node.parent_id else {
                // is_root() filtered parentless nodes into `root` above
                continue;
            };
            if store.get(&parent_id).is_none() {
                return Err(CascadeError::Structural(format!(
                    "snapshot node {} references missing parent {parent_id}",
                    node.id
                )));
            }
            let expanded = node.is_expanded;
            let id = node.id;
            store.attach_children(parent_id, vec![node])?;
            // attach_children marks the parent expanded, which is what the
            // snapshot already recorded; restore the child's own flag.
            if let Some(restored) = store.get_mut(&id) {
                restored.is_expanded = expanded;
            }
        }

        Ok(store)
    }
}

/// Debounced writer for graph snapshots.
pub struct SnapshotStore {
    path: PathBuf,
    debounce: Duration,
    pending: Mutex<Option<GraphSnapshot>>,
}

impl SnapshotStore {
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Load the persisted snapshot, if any. Missing, empty, or corrupt
    /// files degrade to `None` (cold start) with a log line.
    pub async fn load(&self) -> Option<GraphSnapshot> {
        if !self.path.exists() {
            return None;
        }
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read graph snapshot {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str::<GraphSnapshot>(&content) {
            Ok(snapshot) if snapshot.is_empty() => None,
            Ok(snapshot) => {
                info!(
                    nodes = snapshot.nodes.len(),
                    links = snapshot.links.len(),
                    "Loaded graph snapshot from {}",
                    self.path.display()
                );
                Some(snapshot)
            }
            Err(e) => {
                warn!("Corrupt graph snapshot {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Record the latest state for the next debounced write. Cheap;
    /// replaces any previously scheduled snapshot.
    pub async fn schedule(&self, snapshot: GraphSnapshot) {
        let mut pending = self.pending.lock().await;
        *pending = Some(snapshot);
    }

    /// Write the scheduled snapshot now, if there is one. Failures are
    /// logged, never returned.
    pub async fn flush(&self) {
        let snapshot = {
            let mut pending = self.pending.lock().await;
            pending.take()
        };
        if let Some(snapshot) = snapshot {
            if let Err(e) = self.write(&snapshot).await {
                warn!("Graph snapshot write failed: {}", e);
            } else {
                debug!("Wrote graph snapshot ({} nodes)", snapshot.nodes.len());
            }
        }
    }

    async fn write(&self, snapshot: &GraphSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(cascade_cache::CacheError::from)?;
        }
        let content =
            serde_json::to_string_pretty(snapshot).map_err(cascade_cache::CacheError::from)?;
        fs::write(&self.path, content)
            .await
            .map_err(cascade_cache::CacheError::from)?;
        Ok(())
    }
}

/// Background task that flushes scheduled snapshots on the debounce
/// interval.
pub async fn start_autosave(store: Arc<SnapshotStore>) {
    let interval = store.debounce;
    info!("Starting snapshot autosave task (interval: {:?})", interval);
    loop {
        tokio::time::sleep(interval).await;
        store.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::Fetch;
    use cascade_cache::NodeNarrative;
    use tempfile::TempDir;

    fn sample_store() -> GraphStore {
        let mut store = GraphStore::new();
        let root_id = store.init_root(GraphNode::root("Crisis")).unwrap();
        let root = store.get(&root_id).unwrap().clone();
        let children: Vec<GraphNode> = (0..3)
            .map(|i| GraphNode::primary_effect(&root, format!("P{i}"), i))
            .collect();
        store.attach_children(root_id, children).unwrap();
        store
    }

    #[test]
    fn test_capture_and_restore() {
        let store = sample_store();
        let snapshot = GraphSnapshot::capture(&store);
        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.links.len(), 3);

        let restored = snapshot.restore().unwrap();
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.root_id(), store.root_id());
        assert_eq!(restored.links().len(), 3);
    }

    #[test]
    fn test_restore_normalizes_pending() {
        let mut store = sample_store();
        let id = store.nodes().find(|n| !n.is_root()).unwrap().id;
        store.get_mut(&id).unwrap().memory = Fetch::Pending;

        let restored = GraphSnapshot::capture(&store).restore().unwrap();
        assert!(restored.get(&id).unwrap().memory.is_unfetched());
    }

    #[test]
    fn test_restore_preserves_expanded_flags() {
        let mut store = sample_store();
        let primary = store.nodes().find(|n| n.depth == 1).unwrap().clone();
        let children = vec![
            GraphNode::consequence(&primary, "c1"),
            GraphNode::consequence(&primary, "c2"),
            GraphNode::consequence(&primary, "c3"),
            GraphNode::response(&primary, "r1"),
            GraphNode::response(&primary, "r2"),
        ];
        store.attach_children(primary.id, children).unwrap();

        let restored = GraphSnapshot::capture(&store).restore().unwrap();
        assert!(restored.get(&primary.id).unwrap().is_expanded);
        // Unexpanded siblings stay unexpanded.
        let collapsed = restored
            .nodes()
            .filter(|n| n.depth == 1 && !n.is_expanded)
            .count();
        assert_eq!(collapsed, 2);
    }

    #[test]
    fn test_restore_rejects_dangling_parent() {
        let store = sample_store();
        let mut snapshot = GraphSnapshot::capture(&store);
        // Orphan a node by pointing it at a parent that is not in the snapshot.
        let ghost = crate::graph::node::NodeId::new();
        snapshot
            .nodes
            .iter_mut()
            .find(|n| !n.is_root())
            .unwrap()
            .parent_id = Some(ghost);
        assert!(snapshot.restore().is_err());
    }

    #[test]
    fn test_restore_rejects_rootless_snapshot() {
        let store = sample_store();
        let mut snapshot = GraphSnapshot::capture(&store);
        snapshot.nodes.retain(|n| !n.is_root());
        assert!(snapshot.restore().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let writer = SnapshotStore::new(&path, Duration::from_millis(10));

        assert!(writer.load().await.is_none());

        let store = sample_store();
        writer.schedule(GraphSnapshot::capture(&store)).await;
        writer.flush().await;

        let loaded = writer.load().await.unwrap();
        assert_eq!(loaded.nodes.len(), 4);
    }

    #[tokio::test]
    async fn test_schedule_keeps_latest_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let writer = SnapshotStore::new(&path, Duration::from_millis(10));

        let mut store = sample_store();
        writer.schedule(GraphSnapshot::capture(&store)).await;

        let primary = store.nodes().find(|n| n.depth == 1).unwrap().clone();
        store
            .attach_children(
                primary.id,
                vec![
                    GraphNode::consequence(&primary, "c1"),
                    GraphNode::response(&primary, "r1"),
                ],
            )
            .unwrap();
        writer.schedule(GraphSnapshot::capture(&store)).await;
        writer.flush().await;

        // Only the later snapshot was written.
        let loaded = writer.load().await.unwrap();
        assert_eq!(loaded.nodes.len(), 6);

        // Nothing further pending.
        writer.flush().await;
        assert_eq!(writer.load().await.unwrap().nodes.len(), 6);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_degrades_to_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "not json").await.unwrap();

        let writer = SnapshotStore::new(&path, Duration::from_millis(10));
        assert!(writer.load().await.is_none());
    }

    #[test]
    fn test_ready_payload_survives_restore() {
        let mut store = sample_store();
        let id = store.nodes().find(|n| !n.is_root()).unwrap().id;
        store.get_mut(&id).unwrap().memory = Fetch::Ready(NodeNarrative {
            context: "ctx".to_string(),
            reflections: vec!["a".into(), "b".into(), "c".into()],
            affected_entities: vec!["Transport".into()],
        });

        let restored = GraphSnapshot::capture(&store).restore().unwrap();
        assert!(restored.get(&id).unwrap().memory.is_ready());
    }
}
