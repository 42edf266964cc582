//! # Content-addressed caching layer
//!
//! Three independent caches back the cascade engine:
//!
//! - **narrative**: node narrative payloads, keyed on label alone
//! - **severity**: severity score lists, keyed on label alone
//! - **expansion**: consequence/response sets, keyed on
//!   (label, ancestor chain, country)
//!
//! All operations are synchronous against the in-memory maps (behind an
//! async lock); writes additionally sync to external persistence on a
//! best-effort, fire-and-forget basis. See [`store::CascadeCache::hydrate`]
//! for the load-once startup path.

pub mod store;
pub mod types;

pub use store::{CascadeCache, ContentCache};
pub use types::CacheStats;
