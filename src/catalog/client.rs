use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::cache::{Fetcher, QueryKey};
use crate::config::RemoteConfig;
use crate::error::FetchError;
use crate::mutation::ProductUpdater;

use super::api_types::{ApiCategory, ApiProduct, ApiProductsResponse};
use super::types::{Category, Page, Product, ProductId, ProductPatch};

/// HTTP client for the remote catalog.
///
/// Stateless: one outbound request per call, no retries and no caching.
/// Clone is cheap - reqwest::Client shares its connection pool.
#[derive(Clone)]
pub struct CatalogClient {
  client: Client,
  base_url: Url,
  collection: String,
}

impl CatalogClient {
  pub fn new(config: &RemoteConfig) -> Result<Self> {
    let mut base = config.base_url.trim().to_string();
    // Url::join replaces the last path segment unless the base ends in '/'
    if !base.ends_with('/') {
      base.push('/');
    }
    let base_url =
      Url::parse(&base).map_err(|e| eyre!("Invalid base URL {}: {}", config.base_url, e))?;

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base_url,
      collection: config.collection.trim_matches('/').to_string(),
    })
  }

  /// Collection path the client reads from (e.g. "products")
  pub fn collection(&self) -> &str {
    &self.collection
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn url_for(&self, key: &QueryKey) -> Result<Url, FetchError> {
    let mut url = self
      .base_url
      .join(key.resource())
      .map_err(|e| FetchError::Network(format!("Invalid request URL for {}: {}", key, e)))?;

    let mut params = key.params().peekable();
    if params.peek().is_some() {
      let mut pairs = url.query_pairs_mut();
      for (name, value) in params {
        pairs.append_pair(name, &value.to_string());
      }
    }
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<T, FetchError> {
    let url = self.url_for(key)?;
    debug!(url = %url, "GET");

    let response = self.client.get(url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
      return Err(FetchError::from_status(status, &body));
    }
    Ok(serde_json::from_str(&body)?)
  }

  /// Get one page of the collection
  pub async fn get_page(&self, key: &QueryKey) -> Result<Page, FetchError> {
    let response: ApiProductsResponse = self.get_json(key).await?;
    page_for(key, response)
  }

  /// Get a single product
  pub async fn get_product(&self, key: &QueryKey) -> Result<Product, FetchError> {
    let response: ApiProduct = self.get_json(key).await?;
    Product::try_from(response)
  }

  /// Get all product categories
  pub async fn get_categories(&self, key: &QueryKey) -> Result<Vec<Category>, FetchError> {
    let response: Vec<ApiCategory> = self.get_json(key).await?;
    Ok(response.into_iter().map(Category::from).collect())
  }

  /// Send a partial update and return the product as the remote now has it
  pub async fn update_product(
    &self,
    id: ProductId,
    patch: &ProductPatch,
  ) -> Result<Product, FetchError> {
    let url = self.url_for(&QueryKey::entity(&self.collection, id))?;
    debug!(url = %url, "PATCH");

    let response = self.client.patch(url).json(patch).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
      return Err(FetchError::from_status(status, &body));
    }
    let product: ApiProduct = serde_json::from_str(&body)?;
    Product::try_from(product)
  }
}

impl Fetcher<Page> for CatalogClient {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Page, FetchError>> {
    let this = self.clone();
    let key = key.clone();
    async move { this.get_page(&key).await }.boxed()
  }
}

impl Fetcher<Product> for CatalogClient {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Product, FetchError>> {
    let this = self.clone();
    let key = key.clone();
    async move { this.get_product(&key).await }.boxed()
  }
}

impl Fetcher<Vec<Category>> for CatalogClient {
  fn fetch(&self, key: &QueryKey) -> BoxFuture<'static, Result<Vec<Category>, FetchError>> {
    let this = self.clone();
    let key = key.clone();
    async move { this.get_categories(&key).await }.boxed()
  }
}

impl ProductUpdater for CatalogClient {
  fn update_product(
    &self,
    id: ProductId,
    patch: &ProductPatch,
  ) -> BoxFuture<'static, Result<Product, FetchError>> {
    let this = self.clone();
    let patch = patch.clone();
    async move { CatalogClient::update_product(&this, id, &patch).await }.boxed()
  }
}

/// The remote echoes the item count as `limit` for `limit=0` reads; keep the
/// requested 0 so a whole-collection page is recognisable as one
fn page_for(key: &QueryKey, response: ApiProductsResponse) -> Result<Page, FetchError> {
  let mut page = Page::try_from(response)?;
  if key.limit() == Some(0) {
    page.limit = 0;
  }
  Ok(page)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(json: &str) -> ApiProductsResponse {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn test_whole_collection_page_reports_zero_limit() {
    let json = r#"{"products": [{"id": 1}, {"id": 2}], "total": 2, "skip": 0, "limit": 2}"#;
    let page = page_for(&QueryKey::all("products"), response(json)).unwrap();
    assert_eq!(page.limit, 0);
    assert_eq!(page.items.len(), 2);

    let page = page_for(&QueryKey::page("products", 2, 0), response(json)).unwrap();
    assert_eq!(page.limit, 2);
  }

  fn client(base_url: &str) -> CatalogClient {
    CatalogClient::new(&RemoteConfig {
      base_url: base_url.to_string(),
      collection: "/products/".to_string(),
      timeout_secs: 5,
    })
    .unwrap()
  }

  #[test]
  fn test_page_url() {
    let client = client("https://dummyjson.com");
    let url = client
      .url_for(&QueryKey::page(client.collection(), 10, 20))
      .unwrap();
    assert_eq!(url.as_str(), "https://dummyjson.com/products?limit=10&skip=20");
  }

  #[test]
  fn test_url_keeps_resource_case() {
    let client = client("https://example.com");
    let url = client.url_for(&QueryKey::page("Products", 5, 0)).unwrap();
    assert_eq!(url.as_str(), "https://example.com/Products?limit=5&skip=0");
  }

  #[test]
  fn test_entity_url_keeps_base_path() {
    let client = client("https://example.com/api/v1");
    let url = client
      .url_for(&QueryKey::entity(client.collection(), 7))
      .unwrap();
    assert_eq!(url.as_str(), "https://example.com/api/v1/products/7");
  }

  #[test]
  fn test_url_without_params_has_no_query() {
    let client = client("https://dummyjson.com/");
    let url = client
      .url_for(&QueryKey::new("products/categories"))
      .unwrap();
    assert_eq!(url.query(), None);
  }

  #[test]
  fn test_invalid_base_url() {
    let result = CatalogClient::new(&RemoteConfig {
      base_url: "not a url".to_string(),
      collection: "products".to_string(),
      timeout_secs: 5,
    });
    assert!(result.is_err());
  }
}
