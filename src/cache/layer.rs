//! In-memory query cache that sits between the views and the fetch client.
//!
//! Entries are keyed by [`QueryKey`] and created by the first subscriber.
//! There is never more than one fetch in flight per key: a subscriber that
//! shows up while a fetch is running attaches to it. Every fetch is tagged
//! with a sequence number, and a result is only applied if it carries the
//! latest number issued for its key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::FetchError;

use super::key::QueryKey;
use super::traits::{
  CacheConfig, Cacheable, EntityId, EntityInvalidator, Fetcher, QuerySnapshot, QueryStatus,
};

/// Keyed store of query results with request deduplication.
///
/// Cloning is cheap and every clone shares the same entries. Methods that may
/// start a fetch (`subscribe`, `invalidate*`) must be called from within a
/// tokio runtime.
pub struct QueryCache<V: Cacheable> {
  shared: Arc<Shared<V>>,
}

struct Shared<V: Cacheable> {
  fetcher: Box<dyn Fetcher<V>>,
  config: CacheConfig,
  state: Mutex<State<V>>,
}

struct State<V> {
  entries: HashMap<QueryKey, Entry<V>>,
  /// Last sequence number handed out, shared by all keys so that a key that
  /// is evicted and recreated never reuses a number
  last_seq: u64,
}

struct Entry<V> {
  status: QueryStatus,
  data: Option<Arc<V>>,
  error: Option<FetchError>,
  fetched_at: Option<Instant>,
  subscribers: usize,
  idle_since: Option<Instant>,
  /// Sequence number of the fetch currently in flight
  in_flight: Option<u64>,
  latest_seq: u64,
  invalidated: bool,
  /// Invalidated while a fetch was in flight; that fetch's result is dropped
  /// and a new one is issued when it lands
  refetch_queued: bool,
  tx: watch::Sender<QuerySnapshot<V>>,
}

impl<V> Entry<V> {
  fn new() -> Self {
    let (tx, _) = watch::channel(QuerySnapshot::default());
    Self {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      subscribers: 0,
      idle_since: None,
      in_flight: None,
      latest_seq: 0,
      invalidated: false,
      refetch_queued: false,
      tx,
    }
  }

  fn is_stale(&self, now: Instant, stale_time: Duration) -> bool {
    self.invalidated
      || self.refetch_queued
      || self
        .fetched_at
        .map_or(true, |at| now.saturating_duration_since(at) > stale_time)
  }

  fn needs_fetch(&self, now: Instant, stale_time: Duration) -> bool {
    self.in_flight.is_none()
      && (self.data.is_none()
        || self.status == QueryStatus::Error
        || self.is_stale(now, stale_time))
  }

  fn begin_fetch(&mut self, seq: u64) {
    self.in_flight = Some(seq);
    self.latest_seq = seq;
    self.status = QueryStatus::Loading;
    self.invalidated = false;
    self.refetch_queued = false;
  }

  /// Forget cached contents of an entry whose fetch is still running. The
  /// running fetch's result is dropped when it lands.
  fn forget(&mut self) {
    self.data = None;
    self.error = None;
    self.fetched_at = None;
    self.refetch_queued = true;
  }

  /// Status to fall back to when a fetch ends without being applied
  fn settled_status(&self) -> QueryStatus {
    if self.error.is_some() {
      QueryStatus::Error
    } else if self.data.is_some() {
      QueryStatus::Success
    } else {
      QueryStatus::Idle
    }
  }

  fn publish(&self, now: Instant, stale_time: Duration) {
    let is_stale = self.data.is_some()
      && (self.status == QueryStatus::Loading || self.is_stale(now, stale_time));
    self.tx.send_replace(QuerySnapshot {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_at,
      is_stale,
    });
  }
}

impl<V: Cacheable> Shared<V> {
  fn lock(&self) -> MutexGuard<'_, State<V>> {
    // Nothing panics while holding the lock, but never let a poisoned
    // mutex take the whole session down.
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn spawn_fetch(shared: &Arc<Self>, key: QueryKey, seq: u64) {
    debug!(key = %key, seq, "fetch started");
    let request = shared.fetcher.fetch(&key);
    let shared = Arc::clone(shared);
    tokio::spawn(async move {
      let result = request.await;
      shared.complete(key, seq, result);
    });
  }

  fn complete(self: &Arc<Self>, key: QueryKey, seq: u64, result: Result<V, FetchError>) {
    let now = Instant::now();
    let stale_time = self.config.stale_time;

    let restart = {
      let mut state = self.lock();
      let State { entries, last_seq } = &mut *state;

      let Some(entry) = entries.get_mut(&key) else {
        debug!(key = %key, seq, "discarding result for evicted entry");
        return;
      };
      if entry.latest_seq != seq || entry.in_flight != Some(seq) {
        debug!(key = %key, seq, latest = entry.latest_seq, "discarding superseded result");
        return;
      }
      entry.in_flight = None;

      if entry.subscribers == 0 {
        debug!(key = %key, seq, "discarding result, no subscribers left");
        if entry.refetch_queued || (entry.data.is_none() && entry.error.is_none()) {
          entries.remove(&key);
        } else {
          entry.status = entry.settled_status();
          entry.invalidated = true;
          entry.publish(now, stale_time);
        }
        return;
      }

      if entry.refetch_queued {
        debug!(key = %key, seq, "result predates invalidation, refetching");
        *last_seq += 1;
        entry.begin_fetch(*last_seq);
        entry.publish(now, stale_time);
        Some(*last_seq)
      } else {
        match result {
          Ok(value) => {
            debug!(key = %key, seq, "fetch succeeded");
            entry.data = Some(Arc::new(value));
            entry.error = None;
            entry.fetched_at = Some(now);
            entry.status = QueryStatus::Success;
          }
          Err(e) => {
            warn!(key = %key, seq, error = %e, "fetch failed");
            entry.error = Some(e);
            entry.status = QueryStatus::Error;
          }
        }
        entry.publish(now, stale_time);
        None
      }
    };

    if let Some(seq) = restart {
      Self::spawn_fetch(self, key, seq);
    }
  }

  fn release(&self, key: &QueryKey) {
    let mut state = self.lock();
    if let Some(entry) = state.entries.get_mut(key) {
      entry.subscribers = entry.subscribers.saturating_sub(1);
      if entry.subscribers == 0 {
        entry.idle_since = Some(Instant::now());
        debug!(key = %key, "entry idle");
      }
    }
  }

  fn evict_idle(&self, state: &mut State<V>, now: Instant) -> usize {
    let grace = self.config.gc_grace;
    let before = state.entries.len();
    state.entries.retain(|key, entry| {
      let expired = entry.subscribers == 0
        && entry.in_flight.is_none()
        && entry
          .idle_since
          .is_some_and(|since| now.saturating_duration_since(since) >= grace);
      if expired {
        debug!(key = %key, "evicting idle entry");
      }
      !expired
    });
    before - state.entries.len()
  }

  fn invalidate_where<P>(self: &Arc<Self>, matches: P) -> usize
  where
    P: Fn(&QueryKey, &Entry<V>) -> bool,
  {
    let now = Instant::now();
    let stale_time = self.config.stale_time;

    let (count, restarts) = {
      let mut state = self.lock();
      let State { entries, last_seq } = &mut *state;

      let keys: Vec<QueryKey> = entries
        .iter()
        .filter(|(key, entry)| matches(key, entry))
        .map(|(key, _)| key.clone())
        .collect();

      let mut restarts = Vec::new();
      for key in &keys {
        let Some(entry) = entries.get_mut(key) else {
          continue;
        };
        if entry.subscribers == 0 {
          if entry.in_flight.is_some() {
            // Kept until the fetch lands so a new subscriber attaches to it
            debug!(key = %key, "forgetting invalidated entry with fetch in flight");
            entry.forget();
            entry.publish(now, stale_time);
          } else {
            debug!(key = %key, "dropping invalidated entry");
            entries.remove(key);
          }
          continue;
        }

        if entry.in_flight.is_some() {
          entry.refetch_queued = true;
        } else {
          *last_seq += 1;
          entry.begin_fetch(*last_seq);
          restarts.push((key.clone(), *last_seq));
        }
        entry.publish(now, stale_time);
      }
      (keys.len(), restarts)
    };

    for (key, seq) in restarts {
      Self::spawn_fetch(self, key, seq);
    }
    count
  }
}

impl<V: Cacheable> QueryCache<V> {
  pub fn new(fetcher: impl Fetcher<V>, config: CacheConfig) -> Self {
    Self {
      shared: Arc::new(Shared {
        fetcher: Box::new(fetcher),
        config,
        state: Mutex::new(State {
          entries: HashMap::new(),
          last_seq: 0,
        }),
      }),
    }
  }

  /// Register interest in a key.
  ///
  /// Creates the entry if needed and starts a fetch when there is no data,
  /// the data is stale, or the last fetch failed. If a fetch for the key is
  /// already in flight, the new subscriber simply waits for it.
  pub fn subscribe(&self, key: QueryKey) -> QueryHandle<V> {
    let now = Instant::now();
    let stale_time = self.shared.config.stale_time;

    let (rx, start) = {
      let mut state = self.shared.lock();
      self.shared.evict_idle(&mut state, now);
      let State { entries, last_seq } = &mut *state;

      let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
      entry.subscribers += 1;
      entry.idle_since = None;

      let start = if let Some(seq) = entry.in_flight {
        debug!(key = %key, seq, "attaching to in-flight fetch");
        None
      } else if entry.needs_fetch(now, stale_time) {
        *last_seq += 1;
        entry.begin_fetch(*last_seq);
        entry.publish(now, stale_time);
        Some(*last_seq)
      } else {
        debug!(key = %key, "serving cached data");
        None
      };
      (entry.tx.subscribe(), start)
    };

    if let Some(seq) = start {
      Shared::spawn_fetch(&self.shared, key.clone(), seq);
    }

    QueryHandle {
      key,
      rx,
      shared: Arc::clone(&self.shared),
    }
  }

  /// Release a subscription. Equivalent to dropping the handle.
  #[cfg(test)]
  pub fn unsubscribe(&self, handle: QueryHandle<V>) {
    drop(handle);
  }

  /// Invalidate every entry whose key matches.
  ///
  /// Subscribed entries are refetched right away; entries nobody subscribes
  /// to are dropped, or emptied if a fetch for them is still running.
  /// Returns the number of matching entries.
  pub fn invalidate<P>(&self, predicate: P) -> usize
  where
    P: Fn(&QueryKey) -> bool,
  {
    let count = self.shared.invalidate_where(|key, _| predicate(key));
    debug!(count, "invalidated entries");
    count
  }

  pub fn invalidate_key(&self, key: &QueryKey) -> usize {
    self.invalidate(|k| k == key)
  }

  /// Evict entries that have had no subscribers for the grace period.
  pub fn collect_garbage(&self) -> usize {
    let mut state = self.shared.lock();
    self.shared.evict_idle(&mut state, Instant::now())
  }

  /// Current state of an entry without subscribing to it
  #[cfg(test)]
  pub fn peek(&self, key: &QueryKey) -> Option<QuerySnapshot<V>> {
    let state = self.shared.lock();
    state.entries.get(key).map(|entry| entry.tx.borrow().clone())
  }

  #[cfg(test)]
  pub fn subscriber_count(&self, key: &QueryKey) -> usize {
    let state = self.shared.lock();
    state.entries.get(key).map_or(0, |entry| entry.subscribers)
  }

  pub fn len(&self) -> usize {
    self.shared.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Drop every entry. Used at session end; outstanding handles stay valid
  /// but stop receiving updates once their entry is gone.
  ///
  /// Entries with a fetch in flight are emptied instead and go away once the
  /// fetch lands, so there is still at most one request per key.
  pub fn clear(&self) {
    let mut state = self.shared.lock();
    debug!(entries = state.entries.len(), "clearing cache");
    state.entries.retain(|_, entry| {
      if entry.in_flight.is_none() {
        return false;
      }
      entry.forget();
      true
    });
  }
}

impl<V: Cacheable> EntityInvalidator for QueryCache<V> {
  fn invalidate_entity(&self, id: EntityId) -> usize {
    // A first load still in flight may or may not contain the entity, and
    // its response could predate the write
    let count = self.shared.invalidate_where(|_, entry| match entry.data.as_deref() {
      Some(data) => data.contains_entity(id),
      None => entry.in_flight.is_some(),
    });
    debug!(id, count, "invalidated entries containing entity");
    count
  }
}

impl<V: Cacheable> Clone for QueryCache<V> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<V: Cacheable> fmt::Debug for QueryCache<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryCache")
      .field("config", &self.shared.config)
      .field("entries", &self.len())
      .finish_non_exhaustive()
  }
}

/// A live subscription to one cache entry.
///
/// Dropping the handle unsubscribes.
pub struct QueryHandle<V: Cacheable> {
  key: QueryKey,
  rx: watch::Receiver<QuerySnapshot<V>>,
  shared: Arc<Shared<V>>,
}

impl<V: Cacheable> QueryHandle<V> {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  /// Latest published state of the entry
  pub fn snapshot(&self) -> QuerySnapshot<V> {
    self.rx.borrow().clone()
  }

  /// Returns the new state if the entry changed since the last poll.
  ///
  /// Call this in your event loop tick handler.
  pub fn poll(&mut self) -> Option<QuerySnapshot<V>> {
    match self.rx.has_changed() {
      Ok(true) => Some(self.rx.borrow_and_update().clone()),
      _ => None,
    }
  }

  /// Wait for the next change. Returns `None` once the entry is gone.
  #[cfg(test)]
  pub async fn changed(&mut self) -> Option<QuerySnapshot<V>> {
    self.rx.changed().await.ok()?;
    Some(self.rx.borrow_and_update().clone())
  }

  /// Wait until the entry is no longer loading.
  pub async fn settled(&mut self) -> QuerySnapshot<V> {
    let settled = self
      .rx
      .wait_for(|snapshot| snapshot.is_settled())
      .await
      .map(|snapshot| (*snapshot).clone())
      .ok();
    settled.unwrap_or_else(|| self.rx.borrow().clone())
  }
}

impl<V: Cacheable> Drop for QueryHandle<V> {
  fn drop(&mut self) {
    self.shared.release(&self.key);
  }
}

impl<V: Cacheable> fmt::Debug for QueryHandle<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueryHandle")
      .field("key", &self.key)
      .finish_non_exhaustive()
  }
}
