//! Favorites endpoints.

use tracing::instrument;

use cornermarket_core::{FavoriteId, ProductId};

use super::types::{Favorite, ListResponse, ProductRef, ToggleResponse};
use super::{ApiClient, ApiError, paths, required};

impl ApiClient {
    /// List the current user's favorites. Both list shapes are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_favorites(&self) -> Result<Vec<Favorite>, ApiError> {
        Ok(self
            .get::<ListResponse<Favorite>>(paths::FAVORITES)
            .await?
            .into_items())
    }

    /// Add a product to favorites.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_favorite(&self, product_id: ProductId) -> Result<Favorite, ApiError> {
        required(self.post(paths::FAVORITES, &ProductRef { product_id }).await?)
    }

    /// Add or remove a product. Returns the membership the backend settled on.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle_favorite(&self, product_id: ProductId) -> Result<ToggleResponse, ApiError> {
        required(
            self.post(paths::FAVORITES_TOGGLE, &ProductRef { product_id })
                .await?,
        )
    }

    /// Delete a favorite record.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(favorite_id = %id))]
    pub async fn remove_favorite(&self, id: FavoriteId) -> Result<(), ApiError> {
        self.delete::<serde_json::Value>(&paths::item(paths::FAVORITES, id))
            .await?;
        Ok(())
    }
}
