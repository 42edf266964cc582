//! Graph data model, store, and snapshot persistence

pub mod node;
pub mod snapshot;
pub mod store;

pub use node::{darken_hex, Fetch, GraphLink, GraphNode, NodeId, NodeType};
pub use snapshot::{start_autosave, GraphSnapshot, SnapshotStore};
pub use store::GraphStore;
