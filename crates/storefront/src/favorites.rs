//! Favorites synchronization.
//!
//! Favorites exist only for signed-in users. The set is rebuilt from the
//! backend after every toggle rather than flipped locally, so membership
//! always matches what the backend settled on.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{instrument, warn};

use cornermarket_core::ProductId;

use crate::api::{ApiClient, Favorite};
use crate::error::{ClientError, add_breadcrumb};
use crate::session::SessionSnapshot;

/// Favorite records plus an index of their product ids.
///
/// Only constructible from the records, so the two never disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    records: Vec<Favorite>,
    ids: HashSet<ProductId>,
}

impl FavoriteSet {
    /// Build the set from favorite records.
    #[must_use]
    pub fn from_records(records: Vec<Favorite>) -> Self {
        let ids = records.iter().map(|f| f.product.id).collect();
        Self { records, ids }
    }

    /// Whether `product_id` is a favorite.
    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.ids.contains(&product_id)
    }

    /// The records, in backend order.
    #[must_use]
    pub fn records(&self) -> &[Favorite] {
        &self.records
    }

    /// Number of favorites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no favorites.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Keeps the favorite set in step with the backend.
#[derive(Clone)]
pub struct FavoritesSynchronizer {
    inner: Arc<FavoritesInner>,
}

struct FavoritesInner {
    api: ApiClient,
    session: watch::Receiver<SessionSnapshot>,
    tx: watch::Sender<FavoriteSet>,
}

impl FavoritesSynchronizer {
    /// Create an empty set gated by `session`.
    #[must_use]
    pub fn new(api: ApiClient, session: watch::Receiver<SessionSnapshot>) -> Self {
        let (tx, _) = watch::channel(FavoriteSet::default());
        Self {
            inner: Arc::new(FavoritesInner { api, session, tx }),
        }
    }

    /// Current set.
    #[must_use]
    pub fn state(&self) -> FavoriteSet {
        self.inner.tx.borrow().clone()
    }

    /// Observe set changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FavoriteSet> {
        self.inner.tx.subscribe()
    }

    /// Whether `product_id` is a favorite.
    #[must_use]
    pub fn is_favorite(&self, product_id: ProductId) -> bool {
        self.inner.tx.borrow().contains(product_id)
    }

    /// Fetch the set. Anonymous sessions and failures leave it empty.
    #[instrument(skip(self))]
    pub async fn load(&self) -> FavoriteSet {
        if !self.is_authenticated() {
            self.replace(FavoriteSet::default());
            return self.state();
        }

        match self.inner.api.list_favorites().await {
            Ok(records) => self.replace(FavoriteSet::from_records(records)),
            Err(e) => {
                warn!(error = %e, "Failed to load favorites, showing none");
                self.replace(FavoriteSet::default());
            }
        }
        self.state()
    }

    /// Add or remove a product, then reload the set.
    ///
    /// Returns the membership of `product_id` after the reload.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] for anonymous sessions and
    /// the backend error if the toggle request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn toggle(&self, product_id: ProductId) -> Result<bool, ClientError> {
        if !self.is_authenticated() {
            return Err(ClientError::NotAuthenticated);
        }

        let product = product_id.to_string();
        add_breadcrumb(
            "favorites",
            "Toggle favorite",
            Some(&[("product_id", product.as_str())]),
        );

        self.inner.api.toggle_favorite(product_id).await?;
        Ok(self.load().await.contains(product_id))
    }

    fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_authenticated()
    }

    fn replace(&self, set: FavoriteSet) {
        self.inner.tx.send_if_modified(|current| {
            if *current == set {
                false
            } else {
                *current = set;
                true
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ClientConfig;
    use crate::session::AuthStatus;

    fn favorite(id: i64, product: i64) -> Favorite {
        serde_json::from_value(json!({
            "id": id,
            "product": {"id": product, "name": "P", "price": "1.00"},
            "created_at": "2025-01-10T12:00:00Z"
        }))
        .unwrap()
    }

    fn synchronizer(status: AuthStatus) -> FavoritesSynchronizer {
        let config = ClientConfig::for_api_url("http://127.0.0.1:9").unwrap();
        let (_tx, rx) = watch::channel(SessionSnapshot { status, user: None });
        FavoritesSynchronizer::new(ApiClient::new(&config).unwrap(), rx)
    }

    #[test]
    fn test_set_matches_records() {
        let set = FavoriteSet::from_records(vec![favorite(1, 42), favorite(2, 7)]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(ProductId::new(42)));
        assert!(set.contains(ProductId::new(7)));
        assert!(!set.contains(ProductId::new(1)));
        assert_eq!(set.records()[0].id.as_i64(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_load_is_empty() {
        let favorites = synchronizer(AuthStatus::Anonymous);
        assert!(favorites.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_toggle_rejected() {
        let favorites = synchronizer(AuthStatus::Anonymous);
        let result = favorites.toggle(ProductId::new(42)).await;
        assert!(matches!(result, Err(ClientError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_load_failure_is_empty() {
        let favorites = synchronizer(AuthStatus::Authenticated);
        assert!(favorites.load().await.is_empty());
        assert!(!favorites.is_favorite(ProductId::new(42)));
    }
}
