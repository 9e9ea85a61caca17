//! Serde-deserializable types matching the remote catalog responses.
//!
//! These types are separate from domain types: raw payloads are parsed here
//! and checked on the way into [`Product`] and [`Page`], so nothing untyped
//! or out of range reaches the cache.

use serde::Deserialize;

use crate::error::FetchError;

use super::types::{Category, Dimensions, Page, Product, Review};

// ============================================================================
// Product payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiReview {
  #[serde(default)]
  pub rating: u8,
  #[serde(default)]
  pub comment: String,
  #[serde(default)]
  pub reviewer_name: String,
  #[serde(default)]
  pub reviewer_email: String,
  pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiDimensions {
  pub width: f64,
  pub height: f64,
  pub depth: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProduct {
  pub id: u64,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub price: f64,
  #[serde(default)]
  pub discount_percentage: f64,
  #[serde(default)]
  pub rating: f64,
  #[serde(default)]
  pub stock: u32,
  pub brand: Option<String>,
  #[serde(default)]
  pub category: String,
  pub thumbnail: Option<String>,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub reviews: Vec<ApiReview>,
  pub weight: Option<f64>,
  pub dimensions: Option<ApiDimensions>,
  pub warranty_information: Option<String>,
  pub shipping_information: Option<String>,
  pub availability_status: Option<String>,
  pub sku: Option<String>,
}

// ============================================================================
// Collection endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProductsResponse {
  #[serde(default)]
  pub products: Vec<ApiProduct>,
  #[serde(default)]
  pub total: u64,
  #[serde(default)]
  pub skip: u64,
  #[serde(default)]
  pub limit: u64,
}

// ============================================================================
// Categories endpoint response
// ============================================================================

/// Categories come back either as bare slugs or as `{slug, name, url}`
/// objects, depending on the remote's version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiCategory {
  Detailed { slug: String, name: String },
  Slug(String),
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl TryFrom<ApiProduct> for Product {
  type Error = FetchError;

  fn try_from(p: ApiProduct) -> Result<Self, Self::Error> {
    let invalid = |field: &str| {
      FetchError::Decode(format!("product {}: {} out of range", p.id, field))
    };
    if !p.price.is_finite() || p.price < 0.0 {
      return Err(invalid("price"));
    }
    if !p.rating.is_finite() || !(0.0..=5.0).contains(&p.rating) {
      return Err(invalid("rating"));
    }
    if !p.discount_percentage.is_finite() || !(0.0..=100.0).contains(&p.discount_percentage) {
      return Err(invalid("discountPercentage"));
    }

    Ok(Product {
      id: p.id,
      title: p.title,
      description: p.description,
      price: p.price,
      discount_percentage: p.discount_percentage,
      rating: p.rating,
      stock: p.stock,
      brand: p.brand.filter(|b| !b.is_empty()),
      category: p.category,
      thumbnail: p.thumbnail,
      tags: p.tags,
      reviews: p.reviews.into_iter().map(Review::from).collect(),
      weight: p.weight,
      dimensions: p.dimensions.map(|d| Dimensions {
        width: d.width,
        height: d.height,
        depth: d.depth,
      }),
      warranty_information: p.warranty_information,
      shipping_information: p.shipping_information,
      availability_status: p.availability_status,
      sku: p.sku,
    })
  }
}

impl From<ApiReview> for Review {
  fn from(r: ApiReview) -> Self {
    Review {
      rating: r.rating,
      comment: r.comment,
      reviewer_name: r.reviewer_name,
      reviewer_email: r.reviewer_email,
      date: r.date,
    }
  }
}

impl TryFrom<ApiProductsResponse> for Page {
  type Error = FetchError;

  fn try_from(resp: ApiProductsResponse) -> Result<Self, Self::Error> {
    let items = resp
      .products
      .into_iter()
      .map(Product::try_from)
      .collect::<Result<Vec<_>, _>>()?;

    // A page can never hold more than the collection
    if items.len() as u64 > resp.total {
      return Err(FetchError::Decode(format!(
        "page holds {} items but total is {}",
        items.len(),
        resp.total
      )));
    }

    Ok(Page {
      items,
      total: resp.total,
      limit: resp.limit,
      skip: resp.skip,
    })
  }
}

impl From<ApiCategory> for Category {
  fn from(c: ApiCategory) -> Self {
    match c {
      ApiCategory::Detailed { slug, name } => Category { slug, name },
      ApiCategory::Slug(slug) => Category {
        name: slug.clone(),
        slug,
      },
    }
  }
}
