//! Normalized query keys.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Query parameter carrying the page size.
pub const LIMIT: &str = "limit";
/// Query parameter carrying the page offset.
pub const SKIP: &str = "skip";

/// Identifier of one logical read against the remote catalog.
///
/// Keys are normalized on construction: the resource path loses its
/// surrounding slashes and is lowercased, parameter names are lowercased, and
/// parameters live in a sorted map. Two keys built from the same resource and
/// parameters compare equal regardless of argument order. `limit=0` asks the
/// remote for the whole collection, so it forces `skip` to 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: String,
  params: BTreeMap<String, u64>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid query key {input:?}: {reason}")]
pub struct InvalidQueryKey {
  input: String,
  reason: String,
}

impl QueryKey {
  /// Key for a resource with no parameters (e.g. `products/categories`).
  pub fn new(resource: &str) -> Self {
    Self {
      resource: normalize_resource(resource),
      params: BTreeMap::new(),
    }
  }

  /// Key for one page of a collection.
  pub fn page(resource: &str, limit: u64, skip: u64) -> Self {
    Self::new(resource)
      .with_param(LIMIT, limit)
      .with_param(SKIP, skip)
  }

  /// Key for the whole collection (the `limit=0` sentinel).
  pub fn all(resource: &str) -> Self {
    Self::page(resource, 0, 0)
  }

  /// Key for a single entity of a collection.
  pub fn entity(resource: &str, id: u64) -> Self {
    Self::new(&format!("{}/{}", resource.trim_matches('/'), id))
  }

  /// Build a key from unordered `(name, value)` pairs.
  pub fn from_pairs<'a, I>(resource: &str, pairs: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, u64)>,
  {
    pairs
      .into_iter()
      .fold(Self::new(resource), |key, (name, value)| {
        key.with_param(name, value)
      })
  }

  pub fn with_param(mut self, name: &str, value: u64) -> Self {
    self.params.insert(name.trim().to_lowercase(), value);
    self.normalize();
    self
  }

  fn normalize(&mut self) {
    if self.params.get(LIMIT) == Some(&0) {
      self.params.insert(SKIP.to_string(), 0);
    }
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn param(&self, name: &str) -> Option<u64> {
    self.params.get(name).copied()
  }

  pub fn limit(&self) -> Option<u64> {
    self.param(LIMIT)
  }

  pub fn skip(&self) -> Option<u64> {
    self.param(SKIP)
  }

  /// Parameters in their normalized (sorted) order.
  pub fn params(&self) -> impl Iterator<Item = (&str, u64)> {
    self.params.iter().map(|(k, v)| (k.as_str(), *v))
  }

  /// Whether this key reads from `resource` (the collection itself, not its
  /// entities or sub-resources).
  pub fn reads(&self, resource: &str) -> bool {
    self.resource == normalize_resource(resource)
  }
}

/// Resource paths go to the remote verbatim, so only surrounding slashes
/// and whitespace are dropped; case is significant.
fn normalize_resource(resource: &str) -> String {
  resource.trim().trim_matches('/').to_string()
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.resource)?;
    for (i, (name, value)) in self.params.iter().enumerate() {
      let sep = if i == 0 { '?' } else { '&' };
      write!(f, "{}{}={}", sep, name, value)?;
    }
    Ok(())
  }
}

impl FromStr for QueryKey {
  type Err = InvalidQueryKey;

  /// Parse `resource?name=value&...`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = |reason: &str| InvalidQueryKey {
      input: s.to_string(),
      reason: reason.to_string(),
    };

    let (resource, query) = match s.split_once('?') {
      Some((resource, query)) => (resource, query),
      None => (s, ""),
    };
    if normalize_resource(resource).is_empty() {
      return Err(invalid("missing resource"));
    }

    let mut key = Self::new(resource);
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
      let value: u64 = value
        .trim()
        .parse()
        .map_err(|_| invalid(&format!("parameter {} is not a non-negative integer", name)))?;
      key = key.with_param(&name, value);
    }
    Ok(key)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_argument_order_does_not_matter() {
    let a = QueryKey::from_pairs("products", [("limit", 10), ("skip", 20)]);
    let b = QueryKey::from_pairs("products", [("skip", 20), ("limit", 10)]);
    assert_eq!(a, b);
    assert_eq!(a, QueryKey::page("products", 10, 20));
  }

  #[test]
  fn test_representation_does_not_matter() {
    let parsed: QueryKey = "/products/?skip=20&LIMIT=10".parse().unwrap();
    assert_eq!(parsed, QueryKey::page("products", 10, 20));
  }

  #[test]
  fn test_resource_case_is_kept() {
    let key = QueryKey::entity("Products/Featured", 3);
    assert_eq!(key.to_string(), "Products/Featured/3");
    assert_eq!(key.resource(), "Products/Featured/3");
    assert_ne!(QueryKey::all("Products"), QueryKey::all("products"));
    assert!(!QueryKey::all("Products").reads("products"));
  }

  #[test]
  fn test_sentinel_limit_ignores_skip() {
    assert_eq!(QueryKey::page("products", 0, 40), QueryKey::all("products"));
    let parsed: QueryKey = "products?limit=0".parse().unwrap();
    assert_eq!(parsed, QueryKey::all("products"));
    assert_eq!(parsed.skip(), Some(0));
  }

  #[test]
  fn test_different_pages_differ() {
    assert_ne!(
      QueryKey::page("products", 10, 0),
      QueryKey::page("products", 10, 10)
    );
    assert_ne!(
      QueryKey::page("products", 10, 0),
      QueryKey::page("carts", 10, 0)
    );
  }

  #[test]
  fn test_display_is_sorted() {
    let key = QueryKey::from_pairs("products", [("skip", 10), ("limit", 5)]);
    assert_eq!(key.to_string(), "products?limit=5&skip=10");
    assert_eq!(QueryKey::entity("/products/", 7).to_string(), "products/7");
  }

  #[test]
  fn test_reads_only_matches_collection() {
    let page = QueryKey::page("products", 10, 0);
    assert!(page.reads("products"));
    assert!(!QueryKey::entity("products", 1).reads("products"));
  }

  #[test]
  fn test_parse_rejects_bad_input() {
    assert!("?limit=1".parse::<QueryKey>().is_err());
    assert!("products?limit=-1".parse::<QueryKey>().is_err());
    assert!("products?limit=ten".parse::<QueryKey>().is_err());
  }
}
