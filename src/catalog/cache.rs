//! Caching implementations for catalog types.

use crate::cache::{Cacheable, EntityId, QueryKey};

use super::types::{Category, Page, Product, ProductId};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Page {
  fn contains_entity(&self, id: EntityId) -> bool {
    self.contains(id)
  }
}

impl Cacheable for Product {
  fn contains_entity(&self, id: EntityId) -> bool {
    self.id == id
  }
}

impl Cacheable for Vec<Category> {
  fn contains_entity(&self, _id: EntityId) -> bool {
    // Categories never hold products
    false
  }
}

// ============================================================================
// Query keys
// ============================================================================

/// Key for a single product
pub fn product_key(collection: &str, id: ProductId) -> QueryKey {
  QueryKey::entity(collection, id)
}

/// Key for the category list of a collection
pub fn categories_key(collection: &str) -> QueryKey {
  QueryKey::new(&format!("{}/categories", collection.trim_matches('/')))
}
