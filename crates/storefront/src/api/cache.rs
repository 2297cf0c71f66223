//! Cache types for catalog responses.

use super::types::{Category, ListResponse, Product};

/// Cache key for a product list query.
pub fn products_key(query: &str) -> String {
    format!("products:{query}")
}

/// Cache key for a single product.
pub fn product_key(id: impl std::fmt::Display) -> String {
    format!("product:{id}")
}

pub const CATEGORIES_KEY: &str = "categories";

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(ListResponse<Product>),
    Product(Box<Product>),
    Categories(Vec<Category>),
}
