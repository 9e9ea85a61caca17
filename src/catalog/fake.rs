//! In-memory catalog remote for tests.
//!
//! Serves the same resources as the HTTP client (`<collection>`,
//! `<collection>/<id>`, `<collection>/categories`) from a local product list.
//! Requests are counted per key, responses can be held behind a gate, and
//! failures can be injected for reads and writes separately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;

use crate::cache::{Fetcher, QueryKey};
use crate::error::FetchError;
use crate::mutation::ProductUpdater;

use super::types::{Category, Page, Product, ProductId, ProductPatch, Review};

const COLLECTION: &str = "products";
/// Page size the remote applies when a request carries no limit
const DEFAULT_LIMIT: u64 = 30;
const CATEGORIES: [&str; 3] = ["beauty", "fragrances", "groceries"];

/// Product with predictable field values derived from its id
pub fn sample_product(id: ProductId) -> Product {
  Product {
    id,
    title: format!("Product {}", id),
    description: format!("Description of product {}", id),
    price: id as f64 + 0.99,
    discount_percentage: 10.0,
    rating: 4.5,
    stock: 10 * id as u32,
    brand: Some("Acme".to_string()),
    category: CATEGORIES[id as usize % CATEGORIES.len()].to_string(),
    thumbnail: None,
    tags: vec![],
    reviews: vec![Review {
      rating: 5,
      comment: "Works".to_string(),
      reviewer_name: "Ada".to_string(),
      reviewer_email: "ada@example.com".to_string(),
      date: None,
    }],
    weight: None,
    dimensions: None,
    warranty_information: None,
    shipping_information: None,
    availability_status: Some("In Stock".to_string()),
    sku: None,
  }
}

/// Apply a patch the way the remote does
pub fn apply_patch(product: &mut Product, patch: &ProductPatch) {
  if let Some(title) = &patch.title {
    product.title = title.clone();
  }
  if let Some(description) = &patch.description {
    product.description = description.clone();
  }
  if let Some(price) = patch.price {
    product.price = price;
  }
  if let Some(discount) = patch.discount_percentage {
    product.discount_percentage = discount;
  }
  if let Some(rating) = patch.rating {
    product.rating = rating;
  }
  if let Some(stock) = patch.stock {
    product.stock = u32::try_from(stock).unwrap_or(0);
  }
  if let Some(brand) = &patch.brand {
    product.brand = Some(brand.clone());
  }
  if let Some(category) = &patch.category {
    product.category = category.clone();
  }
  if let Some(reviews) = &patch.reviews {
    product.reviews = reviews.clone();
  }
}

#[derive(Default)]
struct Inner {
  products: Vec<Product>,
  calls: HashMap<QueryKey, usize>,
  patches: Vec<(ProductId, ProductPatch)>,
  fetch_failure: Option<FetchError>,
  patch_failure: Option<FetchError>,
}

#[derive(Clone)]
pub struct FakeCatalog {
  inner: Arc<Mutex<Inner>>,
  gate: Arc<watch::Sender<bool>>,
}

impl FakeCatalog {
  /// Catalog holding products 1 through `count`
  pub fn with_products(count: u64) -> Self {
    let (gate, _) = watch::channel(true);
    Self {
      inner: Arc::new(Mutex::new(Inner {
        products: (1..=count).map(sample_product).collect(),
        ..Default::default()
      })),
      gate: Arc::new(gate),
    }
  }

  pub fn collection(&self) -> &'static str {
    COLLECTION
  }

  /// Hold every response until `release` is called
  pub fn hold(&self) {
    self.gate.send_replace(false);
  }

  pub fn release(&self) {
    self.gate.send_replace(true);
  }

  pub fn fail_fetches(&self, error: Option<FetchError>) {
    self.inner.lock().unwrap().fetch_failure = error;
  }

  pub fn fail_patches(&self, error: Option<FetchError>) {
    self.inner.lock().unwrap().patch_failure = error;
  }

  /// Number of requests issued for a key
  pub fn calls(&self, key: &QueryKey) -> usize {
    self.inner.lock().unwrap().calls.get(key).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.inner.lock().unwrap().calls.values().sum()
  }

  /// Patches received, in order
  pub fn patches(&self) -> Vec<(ProductId, ProductPatch)> {
    self.inner.lock().unwrap().patches.clone()
  }

  /// Insert a product on the remote at `index`, shifting later pages
  pub fn insert(&self, index: usize, product: Product) {
    self.inner.lock().unwrap().products.insert(index, product);
  }

  /// Product as currently stored on the remote
  pub fn stored(&self, id: ProductId) -> Option<Product> {
    let inner = self.inner.lock().unwrap();
    inner.products.iter().find(|p| p.id == id).cloned()
  }

  fn respond<V, F>(&self, key: &QueryKey, build: F) -> BoxFuture<'static, Result<V, FetchError>>
  where
    V: Send + 'static,
    F: FnOnce(&Inner, &QueryKey) -> Result<V, FetchError> + Send + 'static,
  {
    let failure = {
      let mut inner = self.inner.lock().unwrap();
      *inner.calls.entry(key.clone()).or_default() += 1;
      inner.fetch_failure.clone()
    };
    let inner = Arc::clone(&self.inner);
    let mut gate = self.gate.subscribe();
    let key = key.clone();

    async move {
      let _ = gate.wait_for(|open| *open).await;
      if let Some(e) = failure {
        return Err(e);
      }
      let inner = inner.lock().unwrap();
      build(&inner, &key)
    }
    .boxed()
  }
}

fn not_found(key: &QueryKey) -> FetchError {
  FetchError::Remote {
    status: 404,
    body: format!("{} not found", key),
  }
}

impl Fetcher<Page> for FakeCatalog {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Page, FetchError>> {
    self.respond(key, |inner, key| {
      if !key.reads(COLLECTION) {
        return Err(not_found(key));
      }
      let total = inner.products.len() as u64;
      let limit = key.limit().unwrap_or(DEFAULT_LIMIT);
      let skip = key.skip().unwrap_or(0);
      let items: Vec<Product> = if limit == 0 {
        inner.products.clone()
      } else {
        inner
          .products
          .iter()
          .skip(skip as usize)
          .take(limit as usize)
          .cloned()
          .collect()
      };
      Ok(Page {
        limit,
        items,
        total,
        skip,
      })
    })
  }
}

impl Fetcher<Product> for FakeCatalog {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Product, FetchError>> {
    self.respond(key, |inner, key| {
      let id = key
        .resource()
        .strip_prefix(COLLECTION)
        .and_then(|rest| rest.strip_prefix('/'))
        .and_then(|id| id.parse::<ProductId>().ok())
        .ok_or_else(|| not_found(key))?;
      inner
        .products
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .ok_or_else(|| not_found(key))
    })
  }
}

impl Fetcher<Vec<Category>> for FakeCatalog {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Vec<Category>, FetchError>> {
    self.respond(key, |_, _| {
      Ok(
        CATEGORIES
          .iter()
          .map(|slug| Category {
            slug: slug.to_string(),
            name: slug.to_string(),
          })
          .collect(),
      )
    })
  }
}

impl ProductUpdater for FakeCatalog {
  fn update_product(
    &self,
    id: ProductId,
    patch: &ProductPatch,
  ) -> BoxFuture<'static, Result<Product, FetchError>> {
    let inner = Arc::clone(&self.inner);
    let mut gate = self.gate.subscribe();
    let patch = patch.clone();

    async move {
      let _ = gate.wait_for(|open| *open).await;
      let mut inner = inner.lock().unwrap();
      inner.patches.push((id, patch.clone()));
      if let Some(e) = inner.patch_failure.clone() {
        return Err(e);
      }
      let product = inner
        .products
        .iter_mut()
        .find(|p| p.id == id)
        .ok_or_else(|| not_found(&QueryKey::entity(COLLECTION, id)))?;
      apply_patch(product, &patch);
      Ok(product.clone())
    }
    .boxed()
  }
}
