//! Cascade graph engine
//!
//! Maintains an AI-generated crisis cascade as a strict tree: a root
//! crisis, seven primary effects, and lazily expanded consequence and
//! response branches. The [`coordinator::ExpansionCoordinator`] is the
//! single entry point for mutation; it drives generation through the
//! [`generator::ContentGenerator`] boundary, deduplicates work through
//! the caches in the `cascade-cache` crate, and keeps graph state
//! consistent across concurrent expansions, refreshes, and country
//! context switches.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod generator;
pub mod graph;
pub mod testing;

pub use context::ContextSwitchPolicy;
pub use coordinator::{CoordinatorConfig, ExpandOutcome, ExpansionCoordinator};
pub use error::{CascadeError, Result};
pub use generator::{ContentGenerator, RetryConfig, Retrying, PRIMARY_COUNT};
pub use graph::{Fetch, GraphLink, GraphNode, GraphSnapshot, GraphStore, NodeId, NodeType, SnapshotStore};
