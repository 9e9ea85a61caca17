pub mod api_types;
pub mod cache;
pub mod client;
#[cfg(test)]
pub mod fake;
pub mod types;

pub use cache::{categories_key, product_key};
pub use client::CatalogClient;
pub use types::*;
