//! Catalog endpoints: products, categories and reviews.
//!
//! Product lists, product details and categories are cached. Reviews are
//! always fetched fresh.

use tracing::{debug, instrument};

use cornermarket_core::ProductId;

use super::cache::{CATEGORIES_KEY, CacheValue, product_key, products_key};
use super::types::{Category, ListResponse, NewReview, Product, ProductQuery, Review};
use super::{ApiClient, ApiError, paths, required, with_query};

impl ApiClient {
    /// List products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> Result<ListResponse<Product>, ApiError> {
        let path = with_query(paths::PRODUCTS, &query.pairs());
        let cache_key = products_key(&path);

        if let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let page: ListResponse<Product> = self.get(&path).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Products(page.clone()))
            .await;

        Ok(page)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] with 404 if the product does not exist.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ApiError> {
        let cache_key = product_key(id);

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self.get(&paths::item(paths::PRODUCTS, id)).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// List all categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(CATEGORIES_KEY).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories = self
            .get::<ListResponse<Category>>(paths::CATEGORIES)
            .await?
            .into_items();

        self.inner
            .cache
            .insert(
                CATEGORIES_KEY.to_string(),
                CacheValue::Categories(categories.clone()),
            )
            .await;

        Ok(categories)
    }

    /// List reviews of a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn list_reviews(&self, product: ProductId) -> Result<Vec<Review>, ApiError> {
        let path = with_query(paths::REVIEWS, &[("product", product.to_string())]);
        Ok(self.get::<ListResponse<Review>>(&path).await?.into_items())
    }

    /// Post a review.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the review.
    #[instrument(skip(self, review), fields(product_id = %review.product, rating = review.rating))]
    pub async fn create_review(&self, review: &NewReview) -> Result<Review, ApiError> {
        required(self.post(paths::REVIEWS, review).await?)
    }
}
