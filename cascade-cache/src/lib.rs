//! # cascade-cache
//!
//! Caching and persistence layer for the cascade graph engine.
//!
//! This crate owns everything below the graph: the reversible key codec
//! that makes logical cache keys safe for storage backends, the logical
//! key derivation for the three cache families, the typed in-memory caches
//! with best-effort persistence sync, and the persistence-store boundary
//! itself.
//!
//! ## Example
//!
//! ```no_run
//! use cascade_cache::{CascadeCache, FileStore};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(FileStore::new("./data"));
//! let caches = CascadeCache::new(store);
//!
//! // Load persisted entries once; racing callers share the same load.
//! caches.hydrate().await;
//!
//! let key = cascade_cache::key::expansion_key("Energy Crisis", &[], Some("Chile"));
//! if caches.expansion().get(&key).await.is_none() {
//!     // fall through to generation
//! }
//! # }
//! ```

pub mod cache;
pub mod codec;
pub mod content;
pub mod error;
pub mod key;
pub mod persist;

pub use cache::{CacheStats, CascadeCache, ContentCache};
pub use content::{validate_severity, BranchSet, NodeNarrative, SeverityScore};
pub use error::{CacheError, Result};
pub use key::{expansion_key, narrative_key, severity_key};
pub use persist::{CacheName, FileStore, LoadedCaches, NullStore, PersistenceStore};
