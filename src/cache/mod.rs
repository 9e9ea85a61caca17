//! Client-side query cache.
//!
//! This module provides a catalog-agnostic cache that:
//! - Keys entries by normalized [`QueryKey`]s
//! - Deduplicates concurrent fetches (one in-flight request per key)
//! - Serves fresh data instantly and refetches stale data on subscribe
//! - Keeps the last good value visible when a refetch fails
//! - Invalidates by key predicate or by contained entity id
//! - Evicts entries a grace period after their last subscriber leaves

mod key;
mod layer;
mod traits;

pub use key::{InvalidQueryKey, QueryKey};
pub use layer::{QueryCache, QueryHandle};
pub use traits::{
  CacheConfig, Cacheable, EntityId, EntityInvalidator, Fetcher, QuerySnapshot, QueryStatus,
};
