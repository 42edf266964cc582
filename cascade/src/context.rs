//! Country context switching
//!
//! Changing the country invalidates generated content: cached payloads
//! were produced for the old context and deep branches no longer apply.
//! The policy clears all caches and prunes the graph back to the root
//! plus its primary effects, which collapse and re-expand lazily under
//! the new country.

use crate::graph::GraphStore;
use cascade_cache::CascadeCache;
use tracing::info;

/// What survives a country switch.
#[derive(Debug, Clone)]
pub struct ContextSwitchPolicy {
    /// Nodes at depths greater than this are pruned. Depth 1 keeps the
    /// root and the primary effects.
    pub keep_depth: u32,
}

impl Default for ContextSwitchPolicy {
    fn default() -> Self {
        Self { keep_depth: 1 }
    }
}

impl ContextSwitchPolicy {
    /// Apply a country switch: clear every cache and prune the graph to
    /// the kept depth. Callers hold the store lock, so persisting the
    /// selection stays outside this method.
    pub async fn apply(
        &self,
        new_country: Option<&str>,
        store: &mut GraphStore,
        caches: &CascadeCache,
    ) {
        info!(country = ?new_country, "Switching country context");

        caches.clear_all().await;
        let pruned = store.prune_below_depth(self.keep_depth);
        info!(pruned, keep_depth = self.keep_depth, "Pruned graph for context switch");
    }
}
