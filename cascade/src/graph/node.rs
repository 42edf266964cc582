//! Graph node data model
//!
//! Nodes carry an opaque, never-reused UUID identity, a human-readable
//! label (not unique across the tree), tree placement (parent id + depth),
//! and two independently fetched enrichment payloads represented as
//! explicit tri-state [`Fetch`] fields so that "not yet requested" and
//! "request in flight" are distinct states.

use cascade_cache::{NodeNarrative, SeverityScore};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed color of the root crisis node.
pub const ROOT_COLOR: &str = "#e11d48";

/// Palette for the seven primary effects, assigned by position.
pub const PRIMARY_PALETTE: [&str; 7] = [
    "#f97316", "#eab308", "#22c55e", "#06b6d4", "#3b82f6", "#8b5cf6", "#ec4899",
];

/// Fixed "hopeful" color of response nodes.
pub const RESPONSE_COLOR: &str = "#4ade80";

/// Factor applied to a parent's color for its consequence children.
const CONSEQUENCE_SHADE: f64 = 0.72;

/// Stable node identity. Generated at creation, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a node in the cascade. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    PrimaryEffect,
    Consequence,
    Response,
}

/// Tri-state enrichment field: not requested, request in flight, or value
/// present. The `Pending` marker doubles as the in-flight guard for
/// concurrent enrich calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Fetch<T> {
    #[default]
    Unfetched,
    Pending,
    Ready(T),
}

impl<T> Fetch<T> {
    pub fn is_unfetched(&self) -> bool {
        matches!(self, Fetch::Unfetched)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Fetch::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Fetch::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// An in-flight fetch does not survive a restart; snapshots load
    /// `Pending` back as `Unfetched`.
    pub fn normalized(self) -> Self {
        match self {
            Fetch::Pending => Fetch::Unfetched,
            other => other,
        }
    }
}

/// A node in the cascade graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Opaque identity, globally unique
    pub id: NodeId,

    /// Human-readable label; part of cache-key derivation, not unique
    pub label: String,

    /// Parent node; `None` only for the root
    pub parent_id: Option<NodeId>,

    /// Root is 0; always parent's depth + 1
    pub depth: u32,

    /// Role in the cascade, immutable
    pub node_type: NodeType,

    /// True once enrichment of children has completed; reset when the
    /// subtree is purged
    pub is_expanded: bool,

    /// Narrative payload (context + reflections + affected entities)
    pub memory: Fetch<NodeNarrative>,

    /// Severity category scores
    pub severity: Fetch<Vec<SeverityScore>>,

    /// Presentation color, derived at creation and never re-derived
    pub color: String,
}

impl GraphNode {
    /// Create the root crisis node. Roots start expanded because the
    /// primary effects are built alongside them.
    pub fn root(label: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            label: label.into(),
            parent_id: None,
            depth: 0,
            node_type: NodeType::Root,
            is_expanded: true,
            memory: Fetch::Unfetched,
            severity: Fetch::Unfetched,
            color: ROOT_COLOR.to_string(),
        }
    }

    /// Create a primary effect under the root, colored by palette position.
    pub fn primary_effect(root: &GraphNode, label: impl Into<String>, position: usize) -> Self {
        let color = PRIMARY_PALETTE[position % PRIMARY_PALETTE.len()].to_string();
        Self::child_with_color(root, label, NodeType::PrimaryEffect, color)
    }

    /// Create a consequence child: a darker shade of the parent's color.
    pub fn consequence(parent: &GraphNode, label: impl Into<String>) -> Self {
        let color = darken_hex(&parent.color, CONSEQUENCE_SHADE);
        Self::child_with_color(parent, label, NodeType::Consequence, color)
    }

    /// Create a response child with the fixed hopeful color.
    pub fn response(parent: &GraphNode, label: impl Into<String>) -> Self {
        Self::child_with_color(parent, label, NodeType::Response, RESPONSE_COLOR.to_string())
    }

    fn child_with_color(
        parent: &GraphNode,
        label: impl Into<String>,
        node_type: NodeType,
        color: String,
    ) -> Self {
        Self {
            id: NodeId::new(),
            label: label.into(),
            parent_id: Some(parent.id),
            depth: parent.depth + 1,
            node_type,
            is_expanded: false,
            memory: Fetch::Unfetched,
            severity: Fetch::Unfetched,
            color,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A link in the cascade graph. Links exist iff `target.parent_id ==
/// source.id`; they are derived from node parentage, never authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphLink {
    pub source: NodeId,
    pub target: NodeId,
}

/// Darken a `#rrggbb` color by a multiplicative factor. Inputs that are
/// not 6-digit hex are returned unchanged.
pub fn darken_hex(color: &str, factor: f64) -> String {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 {
        return color.to_string();
    }
    let Ok(rgb) = u32::from_str_radix(hex, 16) else {
        return color.to_string();
    };

    let scale = |c: u32| -> u32 { ((c as f64 * factor).round() as u32).min(255) };
    let r = scale((rgb >> 16) & 0xff);
    let g = scale((rgb >> 8) & 0xff);
    let b = scale(rgb & 0xff);
    format!("#{r:02x}{g:02x}{b:02x}")
}
