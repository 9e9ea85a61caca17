//! Maps the three list consumption modes onto query keys.
//!
//! - **Paged**: one subscribed key per page, `{limit: page_size, skip}`.
//! - **Bulk**: the whole collection through the `limit=0` key.
//! - **Infinite**: pages are fetched one at a time on scroll triggers and
//!   folded into an accumulated list, deduplicated by product id. Folded
//!   pages are released right away; the list lives here, not in the cache.
//!
//! Switching modes releases every key of the old mode, so a late result for
//! an abandoned key is never folded into the new projection.

use std::collections::HashSet;
use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{QueryCache, QueryHandle, QueryKey, QuerySnapshot, QueryStatus};
use crate::catalog::{Page, Product, ProductId};
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
  #[default]
  Paged,
  Bulk,
  Infinite,
}

impl fmt::Display for PaginationMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PaginationMode::Paged => write!(f, "Paged"),
      PaginationMode::Bulk => write!(f, "All"),
      PaginationMode::Infinite => write!(f, "Scroll"),
    }
  }
}

/// What the list view renders.
#[derive(Debug, Clone, Default)]
pub struct Projection {
  pub items: Vec<Product>,
  /// Size of the whole collection as last reported by the remote
  pub total: u64,
  pub is_loading: bool,
  pub error: Option<FetchError>,
}

#[derive(Default)]
struct Scroll {
  seen: HashSet<ProductId>,
  next_skip: u64,
  exhausted: bool,
  /// The page currently being loaded
  pending: Option<QueryHandle<Page>>,
}

enum ModeState {
  Paged { page: u64, handle: QueryHandle<Page> },
  Bulk { handle: QueryHandle<Page> },
  Infinite(Scroll),
}

pub struct PaginationCoordinator {
  cache: QueryCache<Page>,
  resource: String,
  page_size: u64,
  state: ModeState,
  projection: Projection,
  known_total: Option<u64>,
}

impl PaginationCoordinator {
  /// Create a coordinator and enter `mode`. Paged and bulk modes subscribe
  /// right away; infinite mode waits for the first scroll trigger.
  pub fn new(cache: QueryCache<Page>, resource: &str, page_size: u64, mode: PaginationMode) -> Self {
    let mut coordinator = Self {
      cache,
      resource: resource.to_string(),
      page_size: page_size.max(1),
      state: ModeState::Infinite(Scroll::default()),
      projection: Projection::default(),
      known_total: None,
    };
    coordinator.set_mode(mode);
    coordinator
  }

  pub fn set_mode(&mut self, mode: PaginationMode) {
    match mode {
      PaginationMode::Paged => self.go_to_page(1),
      PaginationMode::Bulk => self.load_all(),
      PaginationMode::Infinite => self.start_infinite_scroll(),
    }
  }

  pub fn mode(&self) -> PaginationMode {
    match self.state {
      ModeState::Paged { .. } => PaginationMode::Paged,
      ModeState::Bulk { .. } => PaginationMode::Bulk,
      ModeState::Infinite(_) => PaginationMode::Infinite,
    }
  }

  pub fn projection(&self) -> &Projection {
    &self.projection
  }

  pub fn page_size(&self) -> u64 {
    self.page_size
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  /// Current page number in paged mode (1-based)
  pub fn current_page(&self) -> Option<u64> {
    match self.state {
      ModeState::Paged { page, .. } => Some(page),
      _ => None,
    }
  }

  /// Number of pages at the current page size, once a total is known
  pub fn page_count(&self) -> Option<u64> {
    self
      .known_total
      .map(|total| total.div_ceil(self.page_size).max(1))
  }

  /// Key the coordinator is currently subscribed to, if any
  pub fn current_key(&self) -> Option<&QueryKey> {
    match &self.state {
      ModeState::Paged { handle, .. } | ModeState::Bulk { handle } => Some(handle.key()),
      ModeState::Infinite(scroll) => scroll.pending.as_ref().map(QueryHandle::key),
    }
  }

  /// Whether infinite scroll has loaded the whole collection
  pub fn is_exhausted(&self) -> bool {
    matches!(&self.state, ModeState::Infinite(scroll) if scroll.exhausted)
  }

  // ==========================================================================
  // Mode transitions
  // ==========================================================================

  /// Show page `page` (1-based, clamped to the known page range).
  pub fn go_to_page(&mut self, page: u64) {
    let mut page = page.max(1);
    if let Some(count) = self.page_count() {
      page = page.min(count);
    }
    let key = QueryKey::page(&self.resource, self.page_size, (page - 1) * self.page_size);
    if let ModeState::Paged { handle, .. } = &self.state {
      if handle.key() == &key {
        return;
      }
    }

    debug!(page, key = %key, "go to page");
    // Subscribe before releasing the old key so a shared entry is never
    // momentarily unsubscribed.
    let handle = self.cache.subscribe(key);
    let was_paged = matches!(self.state, ModeState::Paged { .. });
    let previous = std::mem::replace(&mut self.state, ModeState::Paged { page, handle });
    drop(previous);
    if !was_paged {
      self.reset_projection();
    }
    self.apply_current();
  }

  pub fn next_page(&mut self) {
    if let Some(page) = self.current_page() {
      self.go_to_page(page + 1);
    }
  }

  pub fn prev_page(&mut self) {
    if let Some(page) = self.current_page() {
      self.go_to_page(page.saturating_sub(1));
    }
  }

  /// Load the whole collection in one request.
  pub fn load_all(&mut self) {
    if matches!(self.state, ModeState::Bulk { .. }) {
      return;
    }
    let key = QueryKey::all(&self.resource);
    debug!(key = %key, "load all");
    let handle = self.cache.subscribe(key);
    let previous = std::mem::replace(&mut self.state, ModeState::Bulk { handle });
    drop(previous);
    self.reset_projection();
    self.apply_current();
  }

  /// Start a fresh scroll session with an empty list.
  pub fn start_infinite_scroll(&mut self) {
    debug!("start infinite scroll");
    let previous = std::mem::replace(&mut self.state, ModeState::Infinite(Scroll::default()));
    drop(previous);
    self.reset_projection();
  }

  /// Change the page size. Paged mode returns to page 1 and infinite mode
  /// starts over.
  pub fn set_page_size(&mut self, page_size: u64) {
    let page_size = page_size.max(1);
    if page_size == self.page_size {
      return;
    }
    self.page_size = page_size;
    match self.mode() {
      PaginationMode::Paged => self.go_to_page(1),
      PaginationMode::Bulk => {}
      PaginationMode::Infinite => self.start_infinite_scroll(),
    }
  }

  /// Scroll trigger. Requests the next page unless one is already loading
  /// or the collection is exhausted; returns whether a page was requested.
  pub fn near_end_of_list(&mut self) -> bool {
    let key = match &self.state {
      ModeState::Infinite(scroll) if scroll.pending.is_none() && !scroll.exhausted => {
        QueryKey::page(&self.resource, self.page_size, scroll.next_skip)
      }
      ModeState::Infinite(scroll) => {
        debug!(
          pending = scroll.pending.is_some(),
          exhausted = scroll.exhausted,
          "scroll trigger ignored"
        );
        return false;
      }
      _ => return false,
    };

    debug!(key = %key, "loading next scroll page");
    let handle = self.cache.subscribe(key);
    let snapshot = handle.snapshot();
    if let ModeState::Infinite(scroll) = &mut self.state {
      scroll.pending = Some(handle);
    }
    // A cached page is folded immediately
    self.apply(snapshot);
    true
  }

  /// Invalidate every cached page of the collection. Infinite mode starts
  /// over from the first page. Returns the number of invalidated entries.
  pub fn refresh(&mut self) -> usize {
    let resource = self.resource.clone();
    let count = self.cache.invalidate(|key| key.reads(&resource));
    debug!(count, "refresh");
    if self.mode() == PaginationMode::Infinite {
      self.start_infinite_scroll();
      self.near_end_of_list();
    } else {
      self.apply_current();
    }
    count
  }

  /// Swap in an updated product wherever the projection shows it. Returns
  /// whether it was found.
  pub fn replace_entity(&mut self, product: &Product) -> bool {
    let mut found = false;
    for item in self.projection.items.iter_mut().filter(|p| p.id == product.id) {
      *item = product.clone();
      found = true;
    }
    found
  }

  // ==========================================================================
  // Result handling
  // ==========================================================================

  /// Apply any change published for the current key. Returns true if the
  /// projection changed.
  pub fn poll(&mut self) -> bool {
    let snapshot = match &mut self.state {
      ModeState::Paged { handle, .. } | ModeState::Bulk { handle } => handle.poll(),
      ModeState::Infinite(scroll) => scroll.pending.as_mut().and_then(QueryHandle::poll),
    };
    match snapshot {
      Some(snapshot) => {
        self.apply(snapshot);
        true
      }
      None => false,
    }
  }

  /// Wait until the current key is no longer loading and apply its result.
  pub async fn settle(&mut self) {
    let snapshot = match &mut self.state {
      ModeState::Paged { handle, .. } | ModeState::Bulk { handle } => handle.settled().await,
      ModeState::Infinite(scroll) => match scroll.pending.as_mut() {
        Some(handle) => handle.settled().await,
        None => return,
      },
    };
    self.apply(snapshot);
  }

  fn reset_projection(&mut self) {
    self.projection = Projection {
      total: self.known_total.unwrap_or(0),
      ..Default::default()
    };
  }

  fn apply_current(&mut self) {
    let snapshot = match &self.state {
      ModeState::Paged { handle, .. } | ModeState::Bulk { handle } => handle.snapshot(),
      ModeState::Infinite(scroll) => match &scroll.pending {
        Some(handle) => handle.snapshot(),
        None => return,
      },
    };
    self.apply(snapshot);
  }

  fn apply(&mut self, snapshot: QuerySnapshot<Page>) {
    match &mut self.state {
      ModeState::Paged { .. } | ModeState::Bulk { .. } => {
        self.projection.is_loading = snapshot.is_loading();
        self.projection.error = snapshot.error.clone();
        match snapshot.data() {
          Some(page) => {
            self.projection.items = page.items.clone();
            self.projection.total = page.total;
            self.known_total = Some(page.total);
          }
          None => self.projection.items.clear(),
        }
      }
      ModeState::Infinite(scroll) => match snapshot.status {
        QueryStatus::Idle | QueryStatus::Loading => {
          self.projection.is_loading = scroll.pending.is_some();
        }
        QueryStatus::Error => {
          // Keep the cursor so the next trigger retries the same page
          scroll.pending = None;
          self.projection.is_loading = false;
          self.projection.error = snapshot.error.clone();
        }
        QueryStatus::Success => {
          let Some(page) = snapshot.data() else {
            return;
          };
          let before = self.projection.items.len();
          for item in &page.items {
            if scroll.seen.insert(item.id) {
              self.projection.items.push(item.clone());
            }
          }
          scroll.next_skip += self.page_size;
          let loaded = self.projection.items.len() as u64;
          scroll.exhausted =
            page.items.is_empty() || loaded >= page.total || scroll.next_skip >= page.total;
          scroll.pending = None;
          debug!(
            added = self.projection.items.len() - before,
            loaded,
            total = page.total,
            exhausted = scroll.exhausted,
            "folded scroll page"
          );

          self.projection.total = page.total;
          self.projection.is_loading = false;
          self.projection.error = None;
          self.known_total = Some(page.total);
        }
      },
    }
  }
}
