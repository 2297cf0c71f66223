//! Cart endpoints.
//!
//! Every mutation answers with the whole cart, which callers adopt as-is.

use tracing::instrument;

use cornermarket_core::{LineItemId, ProductId};

use super::types::{AddToCart, Cart, UpdateQuantity};
use super::{ApiClient, ApiError, paths};

impl ApiClient {
    /// Fetch the current cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_cart(&self) -> Result<Cart, ApiError> {
        self.get(paths::CART).await
    }

    /// Add `quantity` units of a product. The backend sums repeated adds.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_to_cart(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Option<Cart>, ApiError> {
        self.post(
            paths::CART,
            &AddToCart {
                product_id,
                quantity,
            },
        )
        .await
    }

    /// Set a line's quantity. Zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_cart_item(
        &self,
        line_id: LineItemId,
        quantity: i64,
    ) -> Result<Option<Cart>, ApiError> {
        self.patch(&paths::item(paths::CART, line_id), &UpdateQuantity { quantity })
            .await
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_cart_item(&self, line_id: LineItemId) -> Result<Option<Cart>, ApiError> {
        self.delete(&paths::item(paths::CART, line_id)).await
    }
}
