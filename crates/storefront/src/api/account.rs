//! Profile and order endpoints.

use tracing::instrument;

use cornermarket_core::OrderId;

use super::types::{ListResponse, NewOrder, Order, Profile, ProfileUpdate};
use super::{ApiClient, ApiError, paths, required};

impl ApiClient {
    /// Fetch the buyer profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn get_profile(&self) -> Result<Profile, ApiError> {
        self.get(paths::PROFILE).await
    }

    /// Update the buyer profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the update.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile, ApiError> {
        required(self.patch(paths::PROFILE, update).await?)
    }

    /// List the current user's orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, ApiError> {
        Ok(self
            .get::<ListResponse<Order>>(paths::ORDERS)
            .await?
            .into_items())
    }

    /// Get a single order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] with 404 if the order does not exist.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order, ApiError> {
        self.get(&paths::item(paths::ORDERS, id)).await
    }

    /// Place an order from the current cart. The backend empties the cart.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Status`] with 400 if the cart is empty or the
    /// contact fields are invalid.
    #[instrument(skip(self, order), fields(delivery_method = %order.delivery_method))]
    pub async fn create_order(&self, order: &NewOrder) -> Result<Order, ApiError> {
        required(self.post(paths::ORDERS, order).await?)
    }
}
