//! Authoritative node/link collection
//!
//! The store is an owned arena keyed by stable [`NodeId`]s, with no raw
//! parent/child pointers. Links are never stored: they are derived from
//! node parentage on demand, so node parentage and the link set cannot
//! diverge. Every structural mutation bumps a revision counter so
//! observers can detect node additions and removals cheaply.
//!
//! The store performs the mutations it is asked to and does not
//! second-guess callers; idempotence guards (e.g. "don't expand twice")
//! live in the coordinator.

use crate::error::{CascadeError, Result};
use crate::graph::node::{GraphLink, GraphNode, NodeId};
use std::collections::HashMap;
use tracing::debug;

/// Canonical collection of cascade nodes with derived links.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: HashMap<NodeId, GraphNode>,
    root: Option<NodeId>,
    revision: u64,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the root node. Fails if a root already exists or the node
    /// has a parent.
    pub fn init_root(&mut self, root: GraphNode) -> Result<NodeId> {
        if self.root.is_some() {
            return Err(CascadeError::Structural("root already present".to_string()));
        }
        if !root.is_root() {
            return Err(CascadeError::Structural(
                "root node must not have a parent".to_string(),
            ));
        }
        let id = root.id;
        self.nodes.insert(id, root);
        self.root = Some(id);
        self.revision += 1;
        Ok(id)
    }

    pub fn root_id(&self) -> Option<NodeId> {
        self.root
    }

    pub fn get(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Mutable access to a node's content. Content edits (enrichment
    /// fields, flags) do not count as structural change, so the revision
    /// is untouched.
    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Monotonic counter bumped on every structural mutation; equal
    /// revisions imply an unchanged node set.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Direct children of a node.
    pub fn children(&self, id: &NodeId) -> Vec<&GraphNode> {
        self.nodes
            .values()
            .filter(|n| n.parent_id.as_ref() == Some(id))
            .collect()
    }

    /// Links derived from parentage: one per non-root node.
    pub fn links(&self) -> Vec<GraphLink> {
        self.nodes
            .values()
            .filter_map(|n| {
                n.parent_id.map(|parent| GraphLink {
                    source: parent,
                    target: n.id,
                })
            })
            .collect()
    }

    /// Ordered ancestor labels for a node, oldest-first, excluding both
    /// the root's label and the node's own label. Returns empty if the
    /// node or any ancestor is missing.
    pub fn ancestor_chain(&self, id: &NodeId) -> Vec<String> {
        let Some(node) = self.nodes.get(id) else {
            return vec![];
        };

        let mut chain = vec![];
        let mut current = node.parent_id;
        while let Some(parent_id) = current {
            let Some(parent) = self.nodes.get(&parent_id) else {
                // Broken ancestry; fail safe with an empty chain.
                return vec![];
            };
            if parent.is_root() {
                break;
            }
            chain.push(parent.label.clone());
            current = parent.parent_id;
        }

        chain.reverse();
        chain
    }

    /// Transitive closure of a node's children.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let mut result = vec![];
        let mut frontier = vec![*id];
        while let Some(current) = frontier.pop() {
            for child in self.children(&current) {
                result.push(child.id);
                frontier.push(child.id);
            }
        }
        result
    }

    /// Insert a batch of children under a parent and mark the parent
    /// expanded. Atomic with respect to readers: callers hold the store
    /// behind a single lock, so no observer sees children without the
    /// flag or vice versa.
    pub fn attach_children(&mut self, parent_id: NodeId, children: Vec<GraphNode>) -> Result<()> {
        let parent_depth = match self.nodes.get(&parent_id) {
            Some(parent) => parent.depth,
            None => {
                return Err(CascadeError::Structural(format!(
                    "attach_children: parent {parent_id} not found"
                )))
            }
        };

        for child in &children {
            if child.parent_id != Some(parent_id) {
                return Err(CascadeError::Structural(format!(
                    "attach_children: child {} does not reference parent {parent_id}",
                    child.id
                )));
            }
            if child.depth != parent_depth + 1 {
                return Err(CascadeError::Structural(format!(
                    "attach_children: child {} depth {} != parent depth {} + 1",
                    child.id, child.depth, parent_depth
                )));
            }
        }

        let count = children.len();
        for child in children {
            self.nodes.insert(child.id, child);
        }
        // An empty generated child set still marks the parent expanded.
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.is_expanded = true;
        }
        self.revision += 1;
        debug!("Attached {} children under {}", count, parent_id);
        Ok(())
    }

    /// Remove all descendants of a node (not the node itself) and reset
    /// its expanded flag.
    pub fn prune_subtree(&mut self, id: &NodeId) -> Result<usize> {
        if !self.nodes.contains_key(id) {
            return Err(CascadeError::Structural(format!(
                "prune_subtree: node {id} not found"
            )));
        }

        let doomed = self.descendants(id);
        for victim in &doomed {
            self.nodes.remove(victim);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.is_expanded = false;
        }
        self.revision += 1;
        debug!("Pruned {} descendants of {}", doomed.len(), id);
        Ok(doomed.len())
    }

    /// Remove every node deeper than `max_depth`. Remaining nodes are
    /// untouched except that parents whose children were just removed
    /// have their expanded flag reset. The root keeps its flag as long as
    /// its children survive the cut.
    pub fn prune_below_depth(&mut self, max_depth: u32) -> usize {
        let doomed: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.depth > max_depth)
            .map(|n| n.id)
            .collect();

        let mut orphaned_parents = vec![];
        for victim in &doomed {
            if let Some(node) = self.nodes.remove(victim) {
                if let Some(parent_id) = node.parent_id {
                    orphaned_parents.push(parent_id);
                }
            }
        }

        // Only parents that actually lost children get reset; a node
        // legitimately expanded with an empty child set keeps its flag.
        for parent_id in orphaned_parents {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.is_expanded = false;
            }
        }

        if !doomed.is_empty() {
            self.revision += 1;
        }
        debug!("Pruned {} nodes below depth {}", doomed.len(), max_depth);
        doomed.len()
    }
}
