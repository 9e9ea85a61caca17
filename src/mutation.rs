//! Validated partial updates of catalog products.
//!
//! A submission moves through `Validating -> Submitting -> Succeeded|Failed`.
//! Nothing is sent when validation fails. On success every cached read that
//! contains the product is invalidated, so subscribed views refetch and
//! unsubscribed entries are dropped. A failed write invalidates nothing.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::EntityInvalidator;
use crate::catalog::{Product, ProductId, ProductPatch, Review};
use crate::error::{FetchError, MutationError, ValidationError};

/// Sends partial product updates to the remote.
pub trait ProductUpdater: Send + Sync + 'static {
  fn update_product(
    &self,
    id: ProductId,
    patch: &ProductPatch,
  ) -> BoxFuture<'static, Result<Product, FetchError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutationPhase {
  #[default]
  Idle,
  Validating,
  Submitting,
  Succeeded,
  Failed,
}

/// A write on its way to the remote
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
  pub entity_id: ProductId,
  pub patch: ProductPatch,
  pub submitted_at: DateTime<Utc>,
}

/// Validates and applies product patches, then invalidates cached reads.
#[derive(Clone)]
pub struct MutationPipeline {
  remote: Arc<dyn ProductUpdater>,
  invalidators: Vec<Arc<dyn EntityInvalidator>>,
  phase: Arc<watch::Sender<MutationPhase>>,
  pending: Arc<Mutex<Option<PendingMutation>>>,
}

impl MutationPipeline {
  pub fn new(remote: impl ProductUpdater) -> Self {
    let (phase, _) = watch::channel(MutationPhase::Idle);
    Self {
      remote: Arc::new(remote),
      invalidators: Vec::new(),
      phase: Arc::new(phase),
      pending: Arc::default(),
    }
  }

  /// Invalidate entries of this cache after each successful write
  pub fn invalidates(mut self, cache: impl EntityInvalidator + 'static) -> Self {
    self.invalidators.push(Arc::new(cache));
    self
  }

  #[cfg(test)]
  pub fn phase(&self) -> MutationPhase {
    *self.phase.borrow()
  }

  /// Watch phase transitions
  #[cfg(test)]
  pub fn watch_phase(&self) -> watch::Receiver<MutationPhase> {
    self.phase.subscribe()
  }

  /// The write currently awaiting the remote, if any
  pub fn pending(&self) -> Option<PendingMutation> {
    self
      .pending
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  fn set_phase(&self, phase: MutationPhase) {
    debug!(?phase, "mutation phase");
    self.phase.send_replace(phase);
  }

  fn set_pending(&self, pending: Option<PendingMutation>) {
    *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = pending;
  }

  /// Validate `patch` and apply it to product `id`.
  ///
  /// Returns the product as the remote now has it.
  pub async fn submit(&self, id: ProductId, patch: ProductPatch) -> Result<Product, MutationError> {
    self.set_phase(MutationPhase::Validating);
    if let Err(e) = validate(&patch) {
      warn!(id, error = %e, "rejected product update");
      self.set_phase(MutationPhase::Failed);
      return Err(e.into());
    }

    let request = self.remote.update_product(id, &patch);
    self.set_pending(Some(PendingMutation {
      entity_id: id,
      patch,
      submitted_at: Utc::now(),
    }));
    self.set_phase(MutationPhase::Submitting);
    info!(id, "submitting product update");

    let result = request.await;
    self.set_pending(None);

    match result {
      Ok(product) => {
        let invalidated: usize = self
          .invalidators
          .iter()
          .map(|cache| cache.invalidate_entity(id))
          .sum();
        info!(id, invalidated, "product updated");
        self.set_phase(MutationPhase::Succeeded);
        Ok(product)
      }
      Err(e) => {
        warn!(id, error = %e, "product update failed");
        self.set_phase(MutationPhase::Failed);
        Err(e.into())
      }
    }
  }
}

// ============================================================================
// Validation
// ============================================================================

struct NumericRule {
  field: &'static str,
  min: f64,
  max: Option<f64>,
  step: Option<f64>,
}

const PRICE: NumericRule = NumericRule {
  field: "price",
  min: 0.0,
  max: None,
  step: Some(0.01),
};

const DISCOUNT: NumericRule = NumericRule {
  field: "discountPercentage",
  min: 0.0,
  max: Some(100.0),
  step: Some(0.01),
};

const RATING: NumericRule = NumericRule {
  field: "rating",
  min: 0.0,
  max: Some(5.0),
  step: None,
};

const STOCK: NumericRule = NumericRule {
  field: "stock",
  min: 0.0,
  max: None,
  step: Some(1.0),
};

impl NumericRule {
  fn check(&self, value: f64) -> Result<(), ValidationError> {
    let fail = |reason: String| Err(ValidationError::new(self.field, reason));
    if !value.is_finite() {
      return fail("must be a number".to_string());
    }
    if value < self.min {
      return fail(format!("must be at least {}", self.min));
    }
    if let Some(max) = self.max {
      if value > max {
        return fail(format!("must be at most {}", max));
      }
    }
    if let Some(step) = self.step {
      let steps = value / step;
      if (steps - steps.round()).abs() > 1e-6 {
        return fail(format!("must be a multiple of {}", step));
      }
    }
    Ok(())
  }
}

fn required(field: &str, value: Option<&str>) -> Result<(), ValidationError> {
  match value {
    Some(v) if v.trim().is_empty() => Err(ValidationError::new(field, "is required")),
    _ => Ok(()),
  }
}

fn validate_review(index: usize, review: &Review) -> Result<(), ValidationError> {
  let field = |name: &str| format!("reviews[{}].{}", index, name);
  required(&field("reviewerName"), Some(&review.reviewer_name))?;
  required(&field("reviewerEmail"), Some(&review.reviewer_email))?;
  if !review.reviewer_email.contains('@') {
    return Err(ValidationError::new(
      field("reviewerEmail"),
      "must be an email address",
    ));
  }
  required(&field("comment"), Some(&review.comment))?;
  if !(1..=5).contains(&review.rating) {
    return Err(ValidationError::new(field("rating"), "must be between 1 and 5"));
  }
  Ok(())
}

/// Client-side checks run before a patch is sent.
pub fn validate(patch: &ProductPatch) -> Result<(), ValidationError> {
  if patch.is_empty() {
    return Err(ValidationError::new("patch", "no fields changed"));
  }

  required("title", patch.title.as_deref())?;
  required("description", patch.description.as_deref())?;
  required("category", patch.category.as_deref())?;

  if let Some(price) = patch.price {
    PRICE.check(price)?;
  }
  if let Some(discount) = patch.discount_percentage {
    DISCOUNT.check(discount)?;
  }
  if let Some(rating) = patch.rating {
    RATING.check(rating)?;
  }
  if let Some(stock) = patch.stock {
    STOCK.check(stock as f64)?;
  }
  if let Some(reviews) = &patch.reviews {
    for (i, review) in reviews.iter().enumerate() {
      validate_review(i, review)?;
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheConfig, QueryCache, QueryKey};
  use crate::catalog::fake::FakeCatalog;
  use crate::catalog::{product_key, Page};

  fn price_patch(price: f64) -> ProductPatch {
    ProductPatch {
      price: Some(price),
      ..Default::default()
    }
  }

  fn setup(fake: &FakeCatalog) -> (QueryCache<Page>, QueryCache<Product>, MutationPipeline) {
    let pages = QueryCache::new(fake.clone(), CacheConfig::default());
    let details = QueryCache::new(fake.clone(), CacheConfig::default());
    let pipeline = MutationPipeline::new(fake.clone())
      .invalidates(pages.clone())
      .invalidates(details.clone());
    (pages, details, pipeline)
  }

  async fn drain() {
    for _ in 0..20 {
      tokio::task::yield_now().await;
    }
  }

  #[tokio::test]
  async fn test_successful_edit_refetches_affected_reads() {
    let fake = FakeCatalog::with_products(25);
    let (pages, details, pipeline) = setup(&fake);
    let first = QueryKey::page("products", 10, 0);
    let second = QueryKey::page("products", 10, 10);

    let mut page = pages.subscribe(first.clone());
    let mut other = pages.subscribe(second.clone());
    let mut detail = details.subscribe(product_key("products", 3));
    page.settled().await;
    other.settled().await;
    detail.settled().await;

    let updated = pipeline.submit(3, price_patch(19.99)).await.unwrap();
    assert_eq!(updated.price, 19.99);
    assert_eq!(pipeline.phase(), MutationPhase::Succeeded);
    assert!(pipeline.pending().is_none());

    let snapshot = page.settled().await;
    let item = snapshot.data().unwrap().items.iter().find(|p| p.id == 3).unwrap();
    assert_eq!(item.price, 19.99);
    assert_eq!(detail.settled().await.data().unwrap().price, 19.99);
    assert_eq!(fake.calls(&first), 2);
    // Page without the product is untouched
    assert_eq!(fake.calls(&second), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_edit_during_first_load_refetches_page() {
    let fake = FakeCatalog::with_products(25);
    let (pages, _details, pipeline) = setup(&fake);
    let first = QueryKey::page("products", 10, 0);

    fake.hold();
    let mut page = pages.subscribe(first.clone());
    let task = tokio::spawn({
      let pipeline = pipeline.clone();
      async move { pipeline.submit(3, price_patch(19.99)).await }
    });
    drain().await;
    assert!(page.snapshot().data().is_none());

    fake.release();
    assert!(task.await.unwrap().is_ok());
    let snapshot = page.settled().await;
    let item = snapshot.data().unwrap().items.iter().find(|p| p.id == 3).unwrap();
    assert_eq!(item.price, 19.99);
    assert_eq!(fake.calls(&first), 2);
  }

  #[tokio::test]
  async fn test_edit_drops_unsubscribed_reads() {
    let fake = FakeCatalog::with_products(25);
    let (pages, _details, pipeline) = setup(&fake);
    let first = QueryKey::page("products", 10, 0);

    let mut page = pages.subscribe(first.clone());
    page.settled().await;
    drop(page);

    pipeline.submit(3, price_patch(5.0)).await.unwrap();
    assert!(pages.peek(&first).is_none());

    let mut page = pages.subscribe(first.clone());
    let snapshot = page.settled().await;
    assert_eq!(snapshot.data().unwrap().items[2].price, 5.0);
    assert_eq!(fake.calls(&first), 2);
  }

  #[tokio::test]
  async fn test_failed_patch_keeps_cache() {
    let fake = FakeCatalog::with_products(25);
    let (pages, _details, pipeline) = setup(&fake);
    let first = QueryKey::page("products", 10, 0);

    let mut page = pages.subscribe(first.clone());
    let before = page.settled().await.data().unwrap().items[2].price;

    fake.fail_patches(Some(FetchError::Remote {
      status: 500,
      body: "internal error".into(),
    }));
    let err = pipeline.submit(3, price_patch(99.0)).await.unwrap_err();
    assert!(matches!(
      err,
      MutationError::Remote(FetchError::Remote { status: 500, .. })
    ));
    assert_eq!(pipeline.phase(), MutationPhase::Failed);
    assert!(page.poll().is_none());
    drop(page);

    // Returning to the list is served from cache with the pre-edit value
    let page = pages.subscribe(first.clone());
    let snapshot = page.snapshot();
    assert!(snapshot.is_success());
    assert_eq!(snapshot.data().unwrap().items[2].price, before);
    assert_eq!(fake.calls(&first), 1);
  }

  #[tokio::test]
  async fn test_invalid_patch_is_never_sent() {
    let fake = FakeCatalog::with_products(5);
    let (_pages, _details, pipeline) = setup(&fake);

    let err = pipeline.submit(1, price_patch(-1.0)).await.unwrap_err();
    match err {
      MutationError::Validation(e) => assert_eq!(e.field, "price"),
      other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.phase(), MutationPhase::Failed);
    assert!(fake.patches().is_empty());
  }

  #[tokio::test]
  async fn test_pending_while_submitting() {
    let fake = FakeCatalog::with_products(5);
    let (_pages, _details, pipeline) = setup(&fake);
    let mut phases = pipeline.watch_phase();

    fake.hold();
    let task = tokio::spawn({
      let pipeline = pipeline.clone();
      async move { pipeline.submit(2, price_patch(7.5)).await }
    });
    drain().await;

    assert_eq!(pipeline.phase(), MutationPhase::Submitting);
    let pending = pipeline.pending().unwrap();
    assert_eq!(pending.entity_id, 2);
    assert_eq!(pending.patch.price, Some(7.5));

    fake.release();
    assert!(task.await.unwrap().is_ok());
    phases
      .wait_for(|phase| *phase == MutationPhase::Succeeded)
      .await
      .unwrap();
    assert!(pipeline.pending().is_none());
    assert_eq!(fake.stored(2).unwrap().price, 7.5);
  }

  #[test]
  fn test_validate_numeric_rules() {
    assert!(validate(&price_patch(19.99)).is_ok());
    assert!(validate(&price_patch(0.0)).is_ok());
    assert_eq!(validate(&price_patch(1.005)).unwrap_err().field, "price");
    assert_eq!(validate(&price_patch(f64::NAN)).unwrap_err().field, "price");

    let rating = ProductPatch {
      rating: Some(5.5),
      ..Default::default()
    };
    assert_eq!(validate(&rating).unwrap_err().field, "rating");

    let stock = ProductPatch {
      stock: Some(-1),
      ..Default::default()
    };
    assert_eq!(
      validate(&stock).unwrap_err(),
      ValidationError::new("stock", "must be at least 0")
    );

    let discount = ProductPatch {
      discount_percentage: Some(120.0),
      ..Default::default()
    };
    assert_eq!(
      validate(&discount).unwrap_err().field,
      "discountPercentage"
    );
  }

  #[test]
  fn test_validate_required_fields() {
    assert_eq!(
      validate(&ProductPatch::default()).unwrap_err().field,
      "patch"
    );
    let patch = ProductPatch {
      category: Some("  ".into()),
      ..Default::default()
    };
    assert_eq!(validate(&patch).unwrap_err().field, "category");

    // Brand may be cleared
    let patch = ProductPatch {
      brand: Some(String::new()),
      ..Default::default()
    };
    assert!(validate(&patch).is_ok());
  }

  #[test]
  fn test_validate_reviews() {
    let review = Review {
      rating: 4,
      comment: "Solid".into(),
      reviewer_name: "Lin".into(),
      reviewer_email: "lin@example.com".into(),
      date: None,
    };
    let with = |review: Review| ProductPatch {
      reviews: Some(vec![review]),
      ..Default::default()
    };

    assert!(validate(&with(review.clone())).is_ok());
    assert_eq!(
      validate(&with(Review {
        reviewer_email: "lin".into(),
        ..review.clone()
      }))
      .unwrap_err()
      .field,
      "reviews[0].reviewerEmail"
    );
    assert_eq!(
      validate(&with(Review {
        rating: 0,
        ..review.clone()
      }))
      .unwrap_err()
      .field,
      "reviews[0].rating"
    );
    assert_eq!(
      validate(&with(Review {
        comment: String::new(),
        ..review
      }))
      .unwrap_err()
      .field,
      "reviews[0].comment"
    );
  }
}
