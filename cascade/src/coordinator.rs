//! Expansion coordination
//!
//! [`ExpansionCoordinator`] owns the graph store, the content caches, and
//! the generator, and serializes every state transition on a node:
//!
//! - at most one expansion runs per node at a time, enforced by a pending
//!   flag taken before the first await point;
//! - completions that lost a race against a refresh or a context switch
//!   are detected by a per-node generation counter and discarded without
//!   touching the graph;
//! - enrichment (memory, severity) uses the node's own tri-state fields
//!   as the in-flight guard and rolls back to unfetched on failure.
//!
//! Lock order is always expansions map before graph store. The country
//! selection has its own lock and is only taken while holding neither.

use crate::context::ContextSwitchPolicy;
use crate::error::{CascadeError, Result};
use crate::generator::ContentGenerator;
use crate::graph::{Fetch, GraphNode, GraphSnapshot, GraphStore, NodeId, SnapshotStore};
use cascade_cache::{
    expansion_key, narrative_key, severity_key, BranchSet, CascadeCache, PersistenceStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Nodes at this depth or deeper are never expanded
    pub max_depth: u32,
    /// Label given to the root crisis node on a fresh build
    pub root_label: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            root_label: "Global Crisis".to_string(),
        }
    }
}

/// What an expansion request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Children were attached; carries the number of new nodes
    Expanded(usize),
    /// Nothing to do: node already expanded, at the depth cap, or an
    /// expansion is already in flight
    Skipped,
    /// The generated result was discarded because the node was refreshed,
    /// pruned, or the context switched while the call was in flight
    Stale,
}

/// Per-node expansion bookkeeping.
#[derive(Debug, Default)]
struct NodeExpansion {
    /// An expansion call is between its guard and its commit
    pending: bool,
    /// Bumped by refresh and context switches; a commit whose captured
    /// generation no longer matches is stale
    generation: u64,
}

pub struct ExpansionCoordinator<G> {
    store: Arc<RwLock<GraphStore>>,
    caches: Arc<CascadeCache>,
    generator: G,
    persistence: Arc<dyn PersistenceStore>,
    config: CoordinatorConfig,
    policy: ContextSwitchPolicy,
    country: RwLock<Option<String>>,
    expansions: RwLock<HashMap<NodeId, NodeExpansion>>,
    snapshots: Option<Arc<SnapshotStore>>,
}

impl<G: ContentGenerator> ExpansionCoordinator<G> {
    pub fn new(
        generator: G,
        persistence: Arc<dyn PersistenceStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(GraphStore::new())),
            caches: Arc::new(CascadeCache::new(Arc::clone(&persistence))),
            generator,
            persistence,
            config,
            policy: ContextSwitchPolicy::default(),
            country: RwLock::new(None),
            expansions: RwLock::new(HashMap::new()),
            snapshots: None,
        }
    }

    /// Attach a snapshot writer; graph mutations will schedule debounced
    /// snapshot writes and `initialize` will try to restore from it.
    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotStore>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Shared handle to the graph store for read access.
    pub fn store(&self) -> Arc<RwLock<GraphStore>> {
        Arc::clone(&self.store)
    }

    /// Shared handle to the content caches.
    pub fn caches(&self) -> Arc<CascadeCache> {
        Arc::clone(&self.caches)
    }

    pub async fn country(&self) -> Option<String> {
        self.country.read().await.clone()
    }

    /// Bring the engine up: hydrate caches, restore the persisted country
    /// selection, then either restore the graph from a snapshot or build
    /// a fresh root with its primary effects.
    pub async fn initialize(&self) -> Result<()> {
        self.caches.hydrate().await;

        match self.persistence.load_country().await {
            Ok(country) => *self.country.write().await = country,
            Err(e) => warn!("Failed to load country selection, starting unset: {}", e),
        }

        if let Some(snapshots) = &self.snapshots {
            if let Some(snapshot) = snapshots.load().await {
                match snapshot.restore() {
                    Ok(restored) => {
                        info!(nodes = restored.len(), "Restored graph from snapshot");
                        *self.store.write().await = restored;
                        return Ok(());
                    }
                    Err(e) => warn!("Snapshot rejected, rebuilding graph: {}", e),
                }
            }
        }

        self.build_fresh().await
    }

    /// Build the root and its primary effects from the generator.
    async fn build_fresh(&self) -> Result<()> {
        let country = self.country().await;
        let labels = self.generator.primary_effects(country.as_deref()).await?;

        let root = GraphNode::root(&self.config.root_label);
        let root_for_children = root.clone();
        let mut fresh = GraphStore::new();
        let root_id = fresh.init_root(root)?;
        let primaries = labels
            .iter()
            .enumerate()
            .map(|(i, label)| GraphNode::primary_effect(&root_for_children, label, i))
            .collect();
        fresh.attach_children(root_id, primaries)?;

        info!(nodes = fresh.len(), country = ?country, "Built fresh cascade graph");
        *self.store.write().await = fresh;
        self.schedule_snapshot().await;
        Ok(())
    }

    /// Expand a node: attach its consequence and response children.
    ///
    /// Cache-hit expansions skip the generator entirely. A second call
    /// while the first is in flight returns [`ExpandOutcome::Skipped`]
    /// without generating. Generation failure leaves the node collapsed
    /// and expandable again.
    pub async fn expand(&self, node_id: NodeId) -> Result<ExpandOutcome> {
        // Guard phase, before any await on external work.
        let (label, chain, affected, generation) = {
            let mut expansions = self.expansions.write().await;
            let store = self.store.read().await;
            let node = store
                .get(&node_id)
                .ok_or_else(|| CascadeError::Structural(format!("unknown node {node_id}")))?;

            if node.is_expanded {
                debug!(%node_id, "Expand skipped: already expanded");
                return Ok(ExpandOutcome::Skipped);
            }
            if node.depth >= self.config.max_depth {
                debug!(%node_id, depth = node.depth, "Expand skipped: at depth cap");
                return Ok(ExpandOutcome::Skipped);
            }

            let entry = expansions.entry(node_id).or_default();
            if entry.pending {
                debug!(%node_id, "Expand skipped: already in flight");
                return Ok(ExpandOutcome::Skipped);
            }
            entry.pending = true;

            let affected = node
                .memory
                .ready()
                .map(|m| m.affected_entities.clone())
                .unwrap_or_default();
            (
                node.label.clone(),
                store.ancestor_chain(&node_id),
                affected,
                entry.generation,
            )
        };

        let country = self.country().await;
        let key = expansion_key(&label, &chain, country.as_deref());

        let (branches, from_cache) = match self.caches.expansion().get(&key).await {
            Some(cached) => (Ok(cached), true),
            None => (
                self.generator
                    .expand(&label, &chain, country.as_deref(), &affected)
                    .await,
                false,
            ),
        };

        let branches = match branches {
            Ok(branches) => branches,
            Err(e) => {
                self.clear_pending(node_id).await;
                warn!(%node_id, "Expansion failed, node stays collapsed: {}", e);
                return Err(e);
            }
        };

        // Freshly generated content is cacheable even if the commit below
        // turns out stale; the key describes the content, not the node.
        if !from_cache {
            self.caches.expansion().insert(key, branches.clone()).await;
        }

        let outcome = self.commit_expansion(node_id, generation, branches).await?;
        if matches!(outcome, ExpandOutcome::Expanded(_)) {
            self.schedule_snapshot().await;
        }
        Ok(outcome)
    }

    async fn commit_expansion(
        &self,
        node_id: NodeId,
        generation: u64,
        branches: BranchSet,
    ) -> Result<ExpandOutcome> {
        let mut expansions = self.expansions.write().await;
        let mut store = self.store.write().await;

        // A missing entry means the node was pruned while we generated;
        // re-creating it would track a dead id.
        let Some(entry) = expansions.get_mut(&node_id) else {
            debug!(%node_id, "Discarding expansion of a pruned node");
            return Ok(ExpandOutcome::Stale);
        };
        entry.pending = false;
        if entry.generation != generation {
            debug!(%node_id, "Discarding stale expansion result");
            return Ok(ExpandOutcome::Stale);
        }

        let Some(parent) = store.get(&node_id).cloned() else {
            debug!(%node_id, "Discarding expansion of a pruned node");
            return Ok(ExpandOutcome::Stale);
        };

        let mut children: Vec<GraphNode> = branches
            .consequences
            .iter()
            .map(|label| GraphNode::consequence(&parent, label))
            .collect();
        children.extend(
            branches
                .responses
                .iter()
                .map(|label| GraphNode::response(&parent, label)),
        );
        let count = children.len();
        store.attach_children(node_id, children)?;

        info!(%node_id, children = count, "Expanded node");
        Ok(ExpandOutcome::Expanded(count))
    }

    async fn clear_pending(&self, node_id: NodeId) {
        let mut expansions = self.expansions.write().await;
        if let Some(entry) = expansions.get_mut(&node_id) {
            entry.pending = false;
        }
    }

    /// Throw away a node's subtree and cached expansion, then expand it
    /// again from fresh content. Errors if the node is not expanded.
    pub async fn refresh(&self, node_id: NodeId) -> Result<ExpandOutcome> {
        let (label, chain) = {
            let mut expansions = self.expansions.write().await;
            let mut store = self.store.write().await;
            let node = store
                .get(&node_id)
                .ok_or_else(|| CascadeError::Structural(format!("unknown node {node_id}")))?;
            if !node.is_expanded {
                return Err(CascadeError::Structural(format!(
                    "refresh of a collapsed node {node_id}"
                )));
            }

            let label = node.label.clone();
            let chain = store.ancestor_chain(&node_id);

            // Any in-flight completion for this node is now stale.
            let entry = expansions.entry(node_id).or_default();
            entry.generation += 1;
            entry.pending = false;

            store.prune_subtree(&node_id)?;
            // Descendants took their expansion bookkeeping with them.
            expansions.retain(|id, _| store.get(id).is_some());
            (label, chain)
        };

        let country = self.country().await;
        let cache_key = expansion_key(&label, &chain, country.as_deref());
        self.caches.expansion().remove(&cache_key).await;

        info!(%node_id, "Refreshing node");
        self.expand(node_id).await
    }

    /// Fetch narrative memory for a node. Returns `true` if a fetch
    /// happened, `false` if the field was already ready or in flight. A
    /// node pruned during the fetch drops the result silently.
    pub async fn enrich_memory(&self, node_id: NodeId) -> Result<bool> {
        let (label, chain) = {
            let mut store = self.store.write().await;
            let node = store
                .get(&node_id)
                .ok_or_else(|| CascadeError::Structural(format!("unknown node {node_id}")))?;
            if !node.memory.is_unfetched() {
                return Ok(false);
            }
            let label = node.label.clone();
            let chain = store.ancestor_chain(&node_id);
            if let Some(node) = store.get_mut(&node_id) {
                node.memory = Fetch::Pending;
            }
            (label, chain)
        };

        let cache_key = narrative_key(&label);
        if let Some(cached) = self.caches.narrative().get(&cache_key).await {
            self.commit_memory(node_id, cached).await;
            return Ok(true);
        }

        let country = self.country().await;
        match self.generator.memory(&label, &chain, country.as_deref()).await {
            Ok(narrative) => {
                self.caches
                    .narrative()
                    .insert(cache_key, narrative.clone())
                    .await;
                self.commit_memory(node_id, narrative).await;
                Ok(true)
            }
            Err(e) => {
                let mut store = self.store.write().await;
                if let Some(node) = store.get_mut(&node_id) {
                    if node.memory.is_pending() {
                        node.memory = Fetch::Unfetched;
                    }
                }
                Err(e)
            }
        }
    }

    async fn commit_memory(&self, node_id: NodeId, narrative: cascade_cache::NodeNarrative) {
        let mut store = self.store.write().await;
        match store.get_mut(&node_id) {
            Some(node) if node.memory.is_pending() => {
                node.memory = Fetch::Ready(narrative);
            }
            Some(_) => debug!(%node_id, "Memory result dropped: field no longer pending"),
            None => debug!(%node_id, "Memory result dropped: node pruned"),
        }
        drop(store);
        self.schedule_snapshot().await;
    }

    /// Fetch severity scores for a node. Severity is position-independent:
    /// no ancestor chain is involved, and results are shared across every
    /// node carrying the same label.
    pub async fn enrich_severity(&self, node_id: NodeId) -> Result<bool> {
        let label = {
            let mut store = self.store.write().await;
            let node = store
                .get(&node_id)
                .ok_or_else(|| CascadeError::Structural(format!("unknown node {node_id}")))?;
            if !node.severity.is_unfetched() {
                return Ok(false);
            }
            let label = node.label.clone();
            if let Some(node) = store.get_mut(&node_id) {
                node.severity = Fetch::Pending;
            }
            label
        };

        let cache_key = severity_key(&label);
        if let Some(cached) = self.caches.severity().get(&cache_key).await {
            self.commit_severity(node_id, cached).await;
            return Ok(true);
        }

        let country = self.country().await;
        match self.generator.severity(&label, country.as_deref()).await {
            Ok(scores) => {
                self.caches
                    .severity()
                    .insert(cache_key, scores.clone())
                    .await;
                self.commit_severity(node_id, scores).await;
                Ok(true)
            }
            Err(e) => {
                let mut store = self.store.write().await;
                if let Some(node) = store.get_mut(&node_id) {
                    if node.severity.is_pending() {
                        node.severity = Fetch::Unfetched;
                    }
                }
                Err(e)
            }
        }
    }

    async fn commit_severity(&self, node_id: NodeId, scores: Vec<cascade_cache::SeverityScore>) {
        let mut store = self.store.write().await;
        match store.get_mut(&node_id) {
            Some(node) if node.severity.is_pending() => {
                node.severity = Fetch::Ready(scores);
            }
            Some(_) => debug!(%node_id, "Severity result dropped: field no longer pending"),
            None => debug!(%node_id, "Severity result dropped: node pruned"),
        }
        drop(store);
        self.schedule_snapshot().await;
    }

    /// Switch the country context: invalidate all caches, prune the graph
    /// back to the primaries, and mark every in-flight operation stale.
    pub async fn switch_country(&self, country: Option<String>) {
        // Best-effort persistence, before any lock: a slow store must not
        // stall expansion and enrichment.
        if let Err(e) = self.persistence.save_country(country.as_deref()).await {
            warn!("Failed to persist country selection: {}", e);
        }

        {
            let mut expansions = self.expansions.write().await;
            let mut store = self.store.write().await;
            for entry in expansions.values_mut() {
                entry.generation += 1;
                entry.pending = false;
            }
            self.policy
                .apply(country.as_deref(), &mut store, &self.caches)
                .await;
            // Bookkeeping for pruned nodes goes with them; survivors keep
            // their bumped generations.
            expansions.retain(|id, _| store.get(id).is_some());
        }
        *self.country.write().await = country;
        self.schedule_snapshot().await;
    }

    async fn schedule_snapshot(&self) {
        if let Some(snapshots) = &self.snapshots {
            let store = self.store.read().await;
            let snapshot = GraphSnapshot::capture(&store);
            drop(store);
            snapshots.schedule(snapshot).await;
        }
    }
}
