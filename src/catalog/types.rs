use serde::Serialize;

pub type ProductId = u64;

/// A catalog product
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
  pub id: ProductId,
  pub title: String,
  pub description: String,
  pub price: f64,
  pub discount_percentage: f64,
  pub rating: f64,
  pub stock: u32,
  pub brand: Option<String>,
  pub category: String,
  pub thumbnail: Option<String>,
  pub tags: Vec<String>,
  pub reviews: Vec<Review>,
  pub weight: Option<f64>,
  pub dimensions: Option<Dimensions>,
  pub warranty_information: Option<String>,
  pub shipping_information: Option<String>,
  pub availability_status: Option<String>,
  pub sku: Option<String>,
}

/// Customer review attached to a product. Also the shape sent back in a patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
  pub rating: u8,
  pub comment: String,
  pub reviewer_name: String,
  pub reviewer_email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimensions {
  pub width: f64,
  pub height: f64,
  pub depth: f64,
}

/// Product category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
  pub slug: String,
  pub name: String,
}

/// One window of the product collection, as returned by the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
  pub items: Vec<Product>,
  /// Size of the whole collection on the remote
  pub total: u64,
  /// Page size the remote applied; 0 for a whole-collection read
  pub limit: u64,
  pub skip: u64,
}

impl Page {
  pub fn contains(&self, id: ProductId) -> bool {
    self.items.iter().any(|p| p.id == id)
  }
}

/// Partial update of a product. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub discount_percentage: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub rating: Option<f64>,
  /// Signed so that a negative form entry reaches validation instead of
  /// failing to parse
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stock: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub brand: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reviews: Option<Vec<Review>>,
}

impl ProductPatch {
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_patch_serializes_only_set_fields() {
    let patch = ProductPatch {
      price: Some(19.99),
      discount_percentage: Some(5.0),
      ..Default::default()
    };
    let json = serde_json::to_value(&patch).unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "price": 19.99, "discountPercentage": 5.0 })
    );
  }

  #[test]
  fn test_empty_patch() {
    assert!(ProductPatch::default().is_empty());
    let patch = ProductPatch {
      title: Some(String::new()),
      ..Default::default()
    };
    assert!(!patch.is_empty());
  }
}
