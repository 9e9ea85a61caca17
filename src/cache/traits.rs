//! Core traits and types for the query cache.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::error::FetchError;

use super::key::QueryKey;

/// Stable identifier of a domain entity held inside cached values.
pub type EntityId = u64;

/// Trait for values that can live in a query cache.
///
/// The cache needs to know which entities a value contains so that a write to
/// one entity can invalidate every cached read that includes it.
pub trait Cacheable: Send + Sync + 'static {
  /// Whether this value contains the entity with the given id
  fn contains_entity(&self, id: EntityId) -> bool;
}

/// Issues one request for a key. No retries and no caching: that is the
/// cache's job.
pub trait Fetcher<V>: Send + Sync + 'static {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<V, FetchError>>;
}

/// Something that can drop or refresh cached reads containing an entity.
pub trait EntityInvalidator: Send + Sync {
  /// Returns the number of entries that were invalidated
  fn invalidate_entity(&self, id: EntityId) -> usize;
}

/// Cache timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
  /// How long fetched data is served without refetching on subscribe
  pub stale_time: Duration,
  /// How long an entry with no subscribers is kept before eviction
  pub gc_grace: Duration,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      gc_grace: Duration::from_secs(5 * 60),
    }
  }
}

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
  /// Created but no fetch issued yet
  #[default]
  Idle,
  /// A fetch is in flight (previous data may still be present)
  Loading,
  /// The last fetch succeeded
  Success,
  /// The last fetch failed (previous data may still be present)
  Error,
}

/// Point-in-time view of a cache entry, as delivered to subscribers.
#[derive(Debug)]
pub struct QuerySnapshot<V> {
  pub status: QueryStatus,
  /// Latest successfully fetched value, kept through later failures
  pub data: Option<Arc<V>>,
  pub error: Option<FetchError>,
  pub fetched_at: Option<Instant>,
  /// Whether the data was stale when this snapshot was published
  pub is_stale: bool,
}

// Manual impls: `V` itself does not need to be `Clone` or `Default`.
impl<V> Clone for QuerySnapshot<V> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      is_stale: self.is_stale,
    }
  }
}

impl<V> Default for QuerySnapshot<V> {
  fn default() -> Self {
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      is_stale: false,
    }
  }
}

impl<V> QuerySnapshot<V> {
  pub fn data(&self) -> Option<&V> {
    self.data.as_deref()
  }

  pub fn error(&self) -> Option<&FetchError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Whether a fetch has finished one way or the other
  pub fn is_settled(&self) -> bool {
    matches!(self.status, QueryStatus::Success | QueryStatus::Error)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config() {
    let config = CacheConfig::default();
    assert_eq!(config.stale_time, Duration::from_secs(60));
    assert_eq!(config.gc_grace, Duration::from_secs(300));
  }

  #[test]
  fn test_snapshot_predicates() {
    let idle: QuerySnapshot<i32> = QuerySnapshot::default();
    assert!(!idle.is_loading());
    assert!(!idle.is_settled());
    assert_eq!(idle.data(), None);

    let failed = QuerySnapshot {
      status: QueryStatus::Error,
      data: Some(Arc::new(42)),
      error: Some(FetchError::Network("down".into())),
      fetched_at: None,
      is_stale: false,
    };
    assert!(failed.is_error());
    assert!(failed.is_settled());
    // Stale data survives the failure
    assert_eq!(failed.data(), Some(&42));
    assert_eq!(failed.clone().error(), failed.error());
  }
}
