//! Seller endpoints.
//!
//! Product mutations invalidate the catalog cache so buyers see them on the
//! next read.

use tracing::instrument;

use cornermarket_core::ProductId;

use super::types::{ListResponse, Order, Product, ProductInput, SellerAnalytics};
use super::{ApiClient, ApiError, paths, required};

impl ApiClient {
    /// List the seller's own products, drafts included.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_seller_products(&self) -> Result<Vec<Product>, ApiError> {
        Ok(self
            .get::<ListResponse<Product>>(paths::SELLER_PRODUCTS)
            .await?
            .into_items())
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the product.
    #[instrument(skip(self, input))]
    pub async fn create_seller_product(&self, input: &ProductInput) -> Result<Product, ApiError> {
        let product = required(self.post(paths::SELLER_PRODUCTS, input).await?)?;
        self.invalidate_catalog().await;
        Ok(product)
    }

    /// Update a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the update.
    #[instrument(skip(self, input), fields(product_id = %id))]
    pub async fn update_seller_product(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, ApiError> {
        let product = required(
            self.patch(&paths::item(paths::SELLER_PRODUCTS, id), input)
                .await?,
        )?;
        self.invalidate_catalog().await;
        Ok(product)
    }

    /// Delete a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete_seller_product(&self, id: ProductId) -> Result<(), ApiError> {
        self.delete::<serde_json::Value>(&paths::item(paths::SELLER_PRODUCTS, id))
            .await?;
        self.invalidate_catalog().await;
        Ok(())
    }

    /// List orders containing the seller's products.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_seller_orders(&self) -> Result<Vec<Order>, ApiError> {
        Ok(self
            .get::<ListResponse<Order>>(paths::SELLER_ORDERS)
            .await?
            .into_items())
    }

    /// Fetch dashboard counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn seller_analytics(&self) -> Result<SellerAnalytics, ApiError> {
        self.get(paths::SELLER_ANALYTICS).await
    }
}
