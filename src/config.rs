use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheConfig;
use crate::pagination::PaginationMode;

/// Environment variable overriding `remote.base_url`
pub const BASE_URL_ENV: &str = "SHELF_BASE_URL";

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
  pub remote: RemoteConfig,
  pub pagination: PaginationConfig,
  pub cache: CacheSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
  pub base_url: String,
  /// Collection path under the base URL
  pub collection: String,
  /// Per-request timeout of the HTTP client
  pub timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url: "https://dummyjson.com/".to_string(),
      collection: "products".to_string(),
      timeout_secs: 30,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PaginationConfig {
  pub page_size: u64,
  pub mode: PaginationMode,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    Self {
      page_size: 10,
      mode: PaginationMode::Paged,
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
  /// Seconds fetched data is served without refetching
  pub stale_time_secs: u64,
  /// Seconds an unused entry is kept before eviction
  pub gc_grace_secs: u64,
}

impl Default for CacheSettings {
  fn default() -> Self {
    Self {
      stale_time_secs: 60,
      gc_grace_secs: 300,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (must exist)
  /// 2. ./shelf.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shelf/config.yaml
  ///
  /// Falls back to defaults when no file is found. `SHELF_BASE_URL`
  /// overrides the base URL of whatever was loaded.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
      config.remote.base_url = base_url;
    }
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("shelf.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shelf").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Check values that serde cannot
  pub fn validate(&self) -> Result<()> {
    if self.pagination.page_size == 0 {
      return Err(eyre!("pagination.page_size must be at least 1"));
    }
    Url::parse(&self.remote.base_url)
      .map_err(|e| eyre!("remote.base_url {:?} is not a valid URL: {}", self.remote.base_url, e))?;
    if self.remote.collection.trim_matches('/').is_empty() {
      return Err(eyre!("remote.collection must not be empty"));
    }
    Ok(())
  }

  pub fn cache_config(&self) -> CacheConfig {
    CacheConfig {
      stale_time: Duration::from_secs(self.cache.stale_time_secs),
      gc_grace: Duration::from_secs(self.cache.gc_grace_secs),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.remote.base_url, "https://dummyjson.com/");
    assert_eq!(config.remote.collection, "products");
    assert_eq!(config.pagination.page_size, 10);
    assert_eq!(config.pagination.mode, PaginationMode::Paged);
    assert_eq!(config.cache_config(), CacheConfig::default());
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_file_keeps_defaults() {
    let config = Config::parse(
      "pagination:\n  mode: infinite\ncache:\n  stale_time_secs: 5\n",
    )
    .unwrap();
    assert_eq!(config.pagination.mode, PaginationMode::Infinite);
    assert_eq!(config.pagination.page_size, 10);
    assert_eq!(config.cache_config().stale_time, Duration::from_secs(5));
    assert_eq!(config.cache_config().gc_grace, Duration::from_secs(300));
    assert_eq!(config.remote, RemoteConfig::default());
  }

  #[test]
  fn test_empty_file() {
    assert_eq!(Config::parse("\n").unwrap(), Config::default());
  }

  #[test]
  fn test_unknown_mode_is_rejected() {
    assert!(Config::parse("pagination:\n  mode: sideways\n").is_err());
  }

  #[test]
  fn test_validate() {
    let mut config = Config::default();
    config.pagination.page_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.remote.base_url = "dummyjson".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.remote.collection = "/".to_string();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path() {
    assert!(Config::load(Some(Path::new("/nonexistent/shelf.yaml"))).is_err());
  }
}
