//! Error taxonomy shared by the fetch client, query cache and mutation pipeline.
//!
//! Failures are values: cache entries and mutation outcomes carry these types
//! instead of propagating them as panics.

use thiserror::Error;

/// Maximum length for remote response bodies kept in errors
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// A failed read or write against the remote catalog.
///
/// `Clone` so it can be stored on a cache entry and handed to every
/// subscriber of that entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
  /// Transport failure, no response was received
  #[error("Network error: {0}")]
  Network(String),

  /// The server responded with a non-success status
  #[error("Remote error {status}: {body}")]
  Remote { status: u16, body: String },

  /// The response body did not match the catalog schema
  #[error("Invalid response: {0}")]
  Decode(String),
}

impl FetchError {
  /// Truncate a response body to avoid storing or logging excessive data
  fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
      return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
      end -= 1;
    }
    format!(
      "{}... (truncated, {} total bytes)",
      &body[..end],
      body.len()
    )
  }

  pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
    FetchError::Remote {
      status: status.as_u16(),
      body: Self::truncate_body(body),
    }
  }

  /// HTTP status of a remote failure
  pub fn status(&self) -> Option<u16> {
    match self {
      FetchError::Remote { status, .. } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      FetchError::Decode(e.to_string())
    } else {
      FetchError::Network(e.to_string())
    }
  }
}

impl From<serde_json::Error> for FetchError {
  fn from(e: serde_json::Error) -> Self {
    FetchError::Decode(e.to_string())
  }
}

/// A client-side check that rejected a patch before it was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
  pub field: String,
  pub reason: String,
}

impl ValidationError {
  pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      field: field.into(),
      reason: reason.into(),
    }
  }
}

/// Terminal outcome of a failed submission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
  #[error("Validation failed: {0}")]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Remote(#[from] FetchError),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_status_keeps_short_body() {
    let err = FetchError::from_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
    assert_eq!(
      err,
      FetchError::Remote {
        status: 500,
        body: "boom".to_string()
      }
    );
    assert_eq!(err.status(), Some(500));
    assert_eq!(err.to_string(), "Remote error 500: boom");
  }

  #[test]
  fn test_from_status_truncates_long_body() {
    let body = "x".repeat(2000);
    let err = FetchError::from_status(reqwest::StatusCode::BAD_GATEWAY, &body);
    match err {
      FetchError::Remote { status, body } => {
        assert_eq!(status, 502);
        assert!(body.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(body.ends_with("(truncated, 2000 total bytes)"));
      }
      other => panic!("unexpected error: {:?}", other),
    }
  }

  #[test]
  fn test_truncate_respects_char_boundaries() {
    let body = "é".repeat(400);
    let truncated = FetchError::truncate_body(&body);
    assert!(truncated.contains("truncated, 800 total bytes"));
  }

  #[test]
  fn test_network_error_has_no_status() {
    assert_eq!(FetchError::Network("refused".into()).status(), None);
  }

  #[test]
  fn test_mutation_error_display() {
    let err: MutationError = ValidationError::new("price", "must be at least 0").into();
    assert_eq!(err.to_string(), "Validation failed: price: must be at least 0");

    let err: MutationError = FetchError::Remote {
      status: 500,
      body: "oops".into(),
    }
    .into();
    assert_eq!(err.to_string(), "Remote error 500: oops");
  }
}
